use axiplan::action::{Action, Job};
use axiplan::config::Config;

#[test]
fn job_round_trips_through_a_file() {
    let config = Config::default();
    let actions = vec![
        Action::pen_down(80),
        Action::step_move(1016, 1016, 40).unwrap(),
        Action::step_move(-1016, -1016, 40).unwrap(),
        Action::pen_up(100),
    ];
    let job = Job::new(actions, &config, Some("square.svg".into()));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.job.json");
    job.save(&path).unwrap();

    let loaded = Job::load(&path).unwrap();
    assert_eq!(job, loaded);
    loaded.validate().unwrap();
}

#[test]
fn malformed_job_file_is_rejected_without_touching_anything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.job.json");
    std::fs::write(&path, r#"{ "filename": null, "document": null }"#).unwrap();

    let result = Job::load(&path);
    assert!(result.is_err());
}

#[test]
fn job_file_matches_the_documented_schema() {
    let config = Config::default();
    let job = Job::new(
        vec![Action::pen_down(80), Action::step_move(5, -3, 60).unwrap()],
        &config,
        None,
    );
    let value: serde_json::Value = serde_json::to_value(&job).unwrap();
    assert!(value.get("pen_up_position").is_some());
    assert!(value.get("servo_speed").is_some());
    let actions = value["actions"].as_array().unwrap();
    assert_eq!(actions[0]["name"], "pen_down");
    assert_eq!(actions[1]["name"], "xy_move");
    assert!(actions[1].get("m1").is_some());
    assert!(actions[1].get("duration").is_some());
}
