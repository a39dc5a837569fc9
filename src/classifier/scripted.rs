// 该文件是 Shouyu （手语） 项目的一部分。
// src/classifier/scripted.rs - 按脚本回应的分类器
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

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classifier::{Classifier, ClassifierEvent, ConnectionEvent, Delivery},
  protocol::{PredictRequest, PredictionResponse},
  url_file_path, url_query,
};

#[derive(Error, Debug)]
pub enum ScriptedClassifierError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析错误: {source}")]
  ParseError {
    line: usize,
    source: serde_json::Error,
  },
}

/// 每次发送消耗脚本中的下一条响应
///
/// `script:///path/to/responses.jsonl?loop`，文件每行一个 `prediction` 载荷。
/// 脚本耗尽后请求仍视为已发送，但不再有响应。
#[derive(Debug, Clone)]
pub struct ScriptedClassifier {
  script: VecDeque<PredictionResponse>,
  replay: Vec<PredictionResponse>,
  repeat: bool,
  pending: Vec<ClassifierEvent>,
  sent: usize,
}

impl FromUrlWithScheme for ScriptedClassifier {
  const SCHEME: &'static str = "script";
}

impl FromUrl for ScriptedClassifier {
  type Error = ScriptedClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ScriptedClassifierError::SchemeMismatch);
    }
    let path = url_file_path(url);
    let content = std::fs::read_to_string(&path)?;
    let mut responses = Vec::new();
    for (index, line) in content.lines().enumerate() {
      if line.trim().is_empty() {
        continue;
      }
      let response = serde_json::from_str(line).map_err(|source| {
        ScriptedClassifierError::ParseError {
          line: index + 1,
          source,
        }
      })?;
      responses.push(response);
    }
    info!("载入 {} 条脚本响应: {}", responses.len(), path);
    Ok(Self::new(responses, url_query(url).contains_key("loop")))
  }
}

impl ScriptedClassifier {
  pub fn new(responses: Vec<PredictionResponse>, repeat: bool) -> Self {
    Self {
      script: responses.iter().cloned().collect(),
      replay: responses,
      repeat,
      pending: vec![ClassifierEvent::Connection(ConnectionEvent::Connected)],
      sent: 0,
    }
  }

  pub fn sent(&self) -> usize {
    self.sent
  }

  pub fn remaining(&self) -> usize {
    self.script.len()
  }
}

impl Classifier for ScriptedClassifier {
  type Error = ScriptedClassifierError;

  fn send(&mut self, request: &PredictRequest) -> Result<Delivery, Self::Error> {
    self.sent += 1;
    if self.script.is_empty() && self.repeat {
      self.script.extend(self.replay.iter().cloned());
    }
    match self.script.pop_front() {
      Some(response) => {
        debug!(
          "脚本响应第 {} 次 {} 请求: {:?}",
          self.sent,
          request.kind(),
          response.label
        );
        self.pending.push(ClassifierEvent::Prediction(response));
      }
      None => debug!("脚本已耗尽，第 {} 次请求无响应", self.sent),
    }
    Ok(Delivery::Sent)
  }

  fn poll(&mut self) -> Vec<ClassifierEvent> {
    std::mem::take(&mut self.pending)
  }

  fn close(&mut self) {
    self
      .pending
      .push(ClassifierEvent::Connection(ConnectionEvent::Disconnected));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request() -> PredictRequest {
    PredictRequest::Landmarks {
      landmarks: vec![0.2; 63],
      target: None,
    }
  }

  #[test]
  fn answers_in_order_then_goes_quiet() {
    let mut classifier = ScriptedClassifier::new(
      vec![
        PredictionResponse::ok("A", 0.9, true),
        PredictionResponse::failure("Model not loaded"),
      ],
      false,
    );
    assert_eq!(
      classifier.poll(),
      vec![ClassifierEvent::Connection(ConnectionEvent::Connected)]
    );
    classifier.send(&request()).unwrap();
    classifier.send(&request()).unwrap();
    classifier.send(&request()).unwrap();
    let events = classifier.poll();
    assert_eq!(events.len(), 2);
    assert_eq!(
      events[0],
      ClassifierEvent::Prediction(PredictionResponse::ok("A", 0.9, true))
    );
    assert_eq!(classifier.sent(), 3);
  }

  #[test]
  fn looping_script_restarts() {
    let mut classifier =
      ScriptedClassifier::new(vec![PredictionResponse::ok("B", 0.7, true)], true);
    classifier.poll();
    for _ in 0..3 {
      classifier.send(&request()).unwrap();
    }
    assert_eq!(classifier.poll().len(), 3);
    assert_eq!(classifier.remaining(), 0);
  }
}
