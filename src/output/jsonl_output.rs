// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/jsonl_output.rs - 会话事件记录文件
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
  fs::File,
  io::{BufWriter, Write},
  sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, SessionEvent},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum JsonlOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("写入锁已损坏")]
  Poisoned,
}

/// `jsonl:///path/to/session.jsonl`，加 `?no_frames` 时不记录逐帧状态
pub struct JsonlOutput {
  writer: Arc<Mutex<BufWriter<File>>>,
  frames: bool,
}

impl FromUrlWithScheme for JsonlOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonlOutput {
  type Error = JsonlOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(JsonlOutputError::SchemeMismatch);
    }
    let path = url_file_path(url);
    let frames = !url.query_pairs().any(|(k, _)| k == "no_frames");
    let file = File::create(&path)?;
    info!("会话事件记录到文件: {}", path);
    Ok(JsonlOutput {
      writer: Arc::new(Mutex::new(BufWriter::new(file))),
      frames,
    })
  }
}

impl Render for JsonlOutput {
  type Error = JsonlOutputError;

  fn render_event(&self, event: &SessionEvent) -> Result<(), Self::Error> {
    if !self.frames && matches!(event, SessionEvent::Frame(_)) {
      return Ok(());
    }
    let mut record = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut record {
      map.insert(
        "time".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
      );
    }
    let mut writer = self.writer.lock().map_err(|_| JsonlOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    // 课程事件较少，逐条落盘便于外部实时读取
    if !matches!(event, SessionEvent::Frame(_)) {
      writer.flush()?;
    }
    Ok(())
  }
}

impl Drop for JsonlOutput {
  fn drop(&mut self) {
    if let Ok(mut writer) = self.writer.lock() {
      let _ = writer.flush();
    }
  }
}
