// 该文件是 Shouyu （手语） 项目的一部分。
// tests/lesson.rs - 课程任务与文件接口测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde_json::{Value, json};
use url::Url;

use shouyu::{
  FromUrl,
  classifier::ClassifierWrapper,
  input::InputWrapper,
  output::OutputWrapper,
  pipeline::Pipeline,
  profile::{ModuleProfile, SendMode},
  task::{LessonTask, Task},
};

fn temp_file(name: &str) -> PathBuf {
  std::env::temp_dir().join(format!("shouyu-{}-{}", std::process::id(), name))
}

fn file_url(scheme: &str, path: &Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

fn write_frames(path: &Path, count: u64) {
  let lines: Vec<String> = (0..count)
    .map(|t| {
      let landmarks: Vec<Value> = (0..21)
        .map(|i| json!({"x": 0.3 + i as f64 * 0.01, "y": 0.5, "z": -0.02}))
        .collect();
      json!({
        "timestamp_ms": t * 100,
        "hands": [{"handedness": "Right", "landmarks": landmarks}]
      })
      .to_string()
    })
    .collect();
  std::fs::write(path, lines.join("\n")).unwrap();
}

fn read_lines(path: &Path) -> Vec<Value> {
  std::fs::read_to_string(path)
    .unwrap()
    .lines()
    .map(|l| serde_json::from_str(l).unwrap())
    .collect()
}

#[test]
fn scripted_lesson_completes_all_targets() {
  let frames = temp_file("lesson-frames.jsonl");
  let script = temp_file("lesson-script.jsonl");
  let events = temp_file("lesson-events.jsonl");
  write_frames(&frames, 40);
  std::fs::write(
    &script,
    [
      r#"{"success": true, "label": "hello", "confidence": 0.8}"#,
      r#"{"success": true, "label": "Hello", "confidence": 0.7, "stable": null}"#,
      r#"{"success": false, "error": "Model not loaded"}"#,
      r#"{"success": true, "label": "Thanks", "confidence": 0.9, "stable": true}"#,
      r#"{"success": true, "label": "Thanks", "confidence": 0.9}"#,
    ]
    .join("\n"),
  )
  .unwrap();

  let pipeline = Pipeline::new(
    ModuleProfile::from_url(&Url::parse("preset://words").unwrap()).unwrap(),
  )
  .unwrap();
  let input = InputWrapper::from_url(&file_url("jsonl", &frames)).unwrap();
  let classifier = ClassifierWrapper::from_url(&file_url("script", &script)).unwrap();
  let output = OutputWrapper::from_url(&file_url("jsonl", &events)).unwrap();

  let report = LessonTask::new(pipeline, vec!["Hello".into(), "Thanks".into()])
    .with_drain_timeout(Duration::from_millis(50))
    .run_task(input.into_frames(), classifier, output)
    .unwrap();

  assert!(report.lesson_complete);
  assert_eq!(report.completed, vec!["Hello".to_string(), "Thanks".to_string()]);
  assert_eq!(report.sent, 5);
  assert_eq!(report.predictions, 5);

  let records = read_lines(&events);
  let count = |name: &str| records.iter().filter(|r| r["event"] == name).count();
  assert_eq!(count("advanced"), 2);
  assert_eq!(count("lesson_complete"), 1);
  assert_eq!(count("sent"), 5);
  assert!(count("frame") > 0);
  let sent = records.iter().find(|r| r["event"] == "sent").unwrap();
  assert_eq!(sent["kind"], "landmarks");
  assert_eq!(sent["target"], "Hello");

  for path in [&frames, &script, &events] {
    std::fs::remove_file(path).ok();
  }
}

#[test]
fn record_classifier_captures_wire_lines() {
  let frames = temp_file("record-frames.jsonl");
  let requests = temp_file("record-requests.jsonl");
  write_frames(&frames, 10);

  let pipeline = Pipeline::new(ModuleProfile::preset("alphabet").unwrap()).unwrap();
  let input = InputWrapper::from_url(&file_url("jsonl", &frames)).unwrap();
  let mut url = file_url("record", &requests);
  url.set_query(Some("namespace=/alphabet"));
  let classifier = ClassifierWrapper::from_url(&url).unwrap();
  let output = OutputWrapper::from_url(&Url::parse("log://").unwrap()).unwrap();

  let report = LessonTask::new(pipeline, vec!["B".into()])
    .with_drain_timeout(Duration::from_millis(10))
    .run_task(input.into_frames(), classifier, output)
    .unwrap();
  assert_eq!(report.sent, 2);
  assert!(!report.lesson_complete);

  let lines = read_lines(&requests);
  assert_eq!(lines.len(), 2);
  for line in &lines {
    assert_eq!(line["event"], "predict");
    assert_eq!(line["namespace"], "/alphabet");
    assert_eq!(line["data"]["landmarks"].as_array().unwrap().len(), 63);
    assert_eq!(line["data"]["target"], "B");
  }

  std::fs::remove_file(&frames).ok();
  std::fs::remove_file(&requests).ok();
}

#[test]
fn profile_file_round_trip_with_overrides() {
  let path = temp_file("profile.json");
  let mut profile = ModuleProfile::preset("general-words").unwrap();
  profile.name = "classroom-words".into();
  profile.endpoint = Some("tcp://192.168.1.20:5007/general".into());
  profile.to_file(&path).unwrap();

  let mut url = file_url("profile", &path);
  url.set_query(Some("sequence_length=45&confidence_threshold=0.7"));
  let loaded = ModuleProfile::from_url(&url).unwrap();
  assert_eq!(loaded.name, "classroom-words");
  assert_eq!(loaded.layout.vector_len(), 1629);
  assert!(matches!(loaded.mode, SendMode::Sequence { length: 45, .. }));
  assert!((loaded.confidence_threshold - 0.7).abs() < 1e-6);
  assert_eq!(
    loaded.endpoint_url().unwrap().as_str(),
    "tcp://192.168.1.20:5007/general"
  );

  std::fs::remove_file(&path).ok();
}

#[test]
fn unknown_schemes_are_rejected() {
  let url = Url::parse("ftp://example.com/frames").unwrap();
  assert!(InputWrapper::from_url(&url).is_err());
  assert!(ClassifierWrapper::from_url(&url).is_err());
  assert!(OutputWrapper::from_url(&url).is_err());
  assert!(ModuleProfile::from_url(&url).is_err());
  assert!(ModuleProfile::from_url(&Url::parse("preset://unknown").unwrap()).is_err());
}
