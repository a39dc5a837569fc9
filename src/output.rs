// 该文件是 Shouyu （手语） 项目的一部分。
// src/output.rs - 会话事件输出
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

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classifier::{ConnectionEvent, Delivery},
  pipeline::FrameStatus,
  protocol::PredictionResponse,
  tracker::TrackerEvent,
};

/// 会话中产生的事件，只用于界面展示与记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
  Frame(FrameStatus),
  Sent {
    kind: &'static str,
    frames: usize,
    target: Option<String>,
    delivery: Delivery,
  },
  Prediction(PredictionResponse),
  Tracker {
    target: Option<String>,
    outcome: TrackerEvent,
  },
  Connection(ConnectionEvent),
  /// 当前目标完成，切换到下一个
  Advanced {
    completed: String,
    next: Option<String>,
  },
  LessonComplete {
    targets: usize,
  },
}

pub trait Render: Sized {
  type Error;
  fn render_event(&self, event: &SessionEvent) -> Result<(), Self::Error>;
}

mod log_output;
pub use self::log_output::{LogOutput, LogOutputError};

#[cfg(feature = "jsonl_output")]
mod jsonl_output;
#[cfg(feature = "jsonl_output")]
pub use self::jsonl_output::{JsonlOutput, JsonlOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("日志输出错误: {0}")]
  LogOutputError(#[from] LogOutputError),
  #[cfg(feature = "jsonl_output")]
  #[error("JSONL 输出错误: {0}")]
  JsonlOutputError(#[from] JsonlOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "jsonl_output")]
  Jsonl(JsonlOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "jsonl_output")]
      JsonlOutput::SCHEME => Ok(OutputWrapper::Jsonl(JsonlOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_event(&self, event: &SessionEvent) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_event(event).map_err(OutputError::from),
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::Jsonl(output) => output.render_event(event).map_err(OutputError::from),
    }
  }
}
