// 该文件是 Shouyu （手语） 项目的一部分。
// src/protocol.rs - 分类后端通信协议
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

//! 事件式协议。每条消息是一个 JSON 对象：
//!
//! ```json
//! {"namespace": "/numbers", "event": "predict", "data": {"landmarks": [0.0, 0.1]}}
//! ```
//!
//! 客户端发送 `predict`，服务端回复 `prediction`。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::gate::Payload;

pub const PREDICT_EVENT: &str = "predict";
pub const PREDICTION_EVENT: &str = "prediction";

/// `predict` 事件的载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictRequest {
  Sequence {
    sequence: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
  },
  Landmarks {
    landmarks: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
  },
}

impl PredictRequest {
  pub fn from_payload(payload: Payload, target: Option<String>) -> Self {
    match payload {
      Payload::Landmarks(landmarks) => PredictRequest::Landmarks { landmarks, target },
      Payload::Sequence(sequence) => PredictRequest::Sequence { sequence, target },
    }
  }

  pub fn target(&self) -> Option<&str> {
    match self {
      PredictRequest::Landmarks { target, .. } | PredictRequest::Sequence { target, .. } => {
        target.as_deref()
      }
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      PredictRequest::Landmarks { .. } => "landmarks",
      PredictRequest::Sequence { .. } => "sequence",
    }
  }

  pub fn frame_count(&self) -> usize {
    match self {
      PredictRequest::Landmarks { .. } => 1,
      PredictRequest::Sequence { sequence, .. } => sequence.len(),
    }
  }
}

fn stable_by_default() -> bool {
  true
}

/// `stable` 缺失或为 null 时视为 true
fn deserialize_stable<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// `prediction` 事件的载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub label: Option<String>,
  #[serde(default, deserialize_with = "deserialize_confidence")]
  pub confidence: f32,
  #[serde(default = "stable_by_default", deserialize_with = "deserialize_stable")]
  pub stable: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl PredictionResponse {
  pub fn ok(label: &str, confidence: f32, stable: bool) -> Self {
    Self {
      success: true,
      label: Some(label.to_string()),
      confidence,
      stable,
      error: None,
    }
  }

  pub fn failure(error: &str) -> Self {
    Self {
      success: false,
      label: None,
      confidence: 0.0,
      stable: true,
      error: Some(error.to_string()),
    }
  }

  /// 成功且带非空标签的预测
  pub fn usable_label(&self) -> Option<&str> {
    if !self.success {
      return None;
    }
    self.label.as_deref().filter(|l| !l.trim().is_empty())
  }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
  #[error("JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 线上传输的消息外壳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,
  pub event: String,
  #[serde(default)]
  pub data: Value,
}

impl Envelope {
  pub fn predict(namespace: Option<&str>, request: &PredictRequest) -> Result<Self, ProtocolError> {
    Ok(Self {
      namespace: namespace.map(String::from),
      event: PREDICT_EVENT.to_string(),
      data: serde_json::to_value(request)?,
    })
  }

  pub fn prediction(
    namespace: Option<&str>,
    response: &PredictionResponse,
  ) -> Result<Self, ProtocolError> {
    Ok(Self {
      namespace: namespace.map(String::from),
      event: PREDICTION_EVENT.to_string(),
      data: serde_json::to_value(response)?,
    })
  }

  pub fn to_line(&self) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
  }
}

/// 服务端消息
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
  Prediction(PredictionResponse),
  /// 与业务无关的其他事件，例如连接确认
  Other { event: String, data: Value },
}

impl ServerEvent {
  /// 载荷格式错误的 `prediction` 视为一次失败预测，不会中断连接
  pub fn from_envelope(envelope: Envelope) -> Self {
    if envelope.event != PREDICTION_EVENT {
      return ServerEvent::Other {
        event: envelope.event,
        data: envelope.data,
      };
    }
    match serde_json::from_value::<PredictionResponse>(envelope.data) {
      Ok(response) => ServerEvent::Prediction(response),
      Err(e) => ServerEvent::Prediction(PredictionResponse::failure(&format!(
        "malformed prediction payload: {}",
        e
      ))),
    }
  }
}
