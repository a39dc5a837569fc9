// 该文件是 Shouyu （手语） 项目的一部分。
// src/tracker.rs - 预测结果稳定性跟踪
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

//! 需要连续 N 次“标签正确、置信度达标、未标记为不稳定”的预测，
//! 才认定当前目标手势完成。
//!
//! - 置信度达标的错误标签会清空进度；
//! - 低置信度或标记为不稳定的预测、失败或空标签的预测都被忽略，不清空进度。

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};

use crate::protocol::PredictionResponse;

pub const DEFAULT_REQUIRED_STABILITY: u32 = 2;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "count", rename_all = "snake_case")]
pub enum TrackerState {
  Idle,
  Accumulating(u32),
  Completed,
}

/// 一次预测对跟踪器造成的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackerEvent {
  /// 预测不影响进度
  Ignored { reason: IgnoreReason },
  /// 累积了一次合格预测
  Progress { count: u32, required: u32 },
  /// 置信度达标的错误标签清空了进度
  Reset { label: String, confidence: f32 },
  /// 达到要求次数，每个目标只会出现一次
  Completed { target: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
  NoTarget,
  AlreadyCompleted,
  Unusable,
  LowConfidence,
  Unstable,
}

#[derive(Debug, Clone)]
pub struct PredictionTracker {
  target: Option<String>,
  required: u32,
  confidence_threshold: f32,
  history: VecDeque<String>,
  completed: bool,
}

impl PredictionTracker {
  pub fn new(required: u32, confidence_threshold: f32) -> Self {
    let required = required.max(1);
    Self {
      target: None,
      required,
      confidence_threshold,
      history: VecDeque::with_capacity(required as usize),
      completed: false,
    }
  }

  pub fn with_target(mut self, target: &str) -> Self {
    self.set_target(Some(target));
    self
  }

  /// 切换目标，进度清零
  pub fn set_target(&mut self, target: Option<&str>) {
    self.target = target.map(String::from);
    self.reset();
  }

  pub fn target(&self) -> Option<&str> {
    self.target.as_deref()
  }

  pub fn reset(&mut self) {
    self.history.clear();
    self.completed = false;
  }

  pub fn state(&self) -> TrackerState {
    if self.completed {
      TrackerState::Completed
    } else if self.history.is_empty() {
      TrackerState::Idle
    } else {
      TrackerState::Accumulating(self.history.len() as u32)
    }
  }

  pub fn match_count(&self) -> u32 {
    self.history.len() as u32
  }

  pub fn required(&self) -> u32 {
    self.required
  }

  pub fn observe(&mut self, prediction: &PredictionResponse) -> TrackerEvent {
    let Some(target) = self.target.clone() else {
      return TrackerEvent::Ignored {
        reason: IgnoreReason::NoTarget,
      };
    };
    if self.completed {
      return TrackerEvent::Ignored {
        reason: IgnoreReason::AlreadyCompleted,
      };
    }
    let Some(label) = prediction.usable_label() else {
      return TrackerEvent::Ignored {
        reason: IgnoreReason::Unusable,
      };
    };

    let matches = label.to_lowercase() == target.to_lowercase();
    let confident = prediction.confidence >= self.confidence_threshold;

    if matches && confident && prediction.stable {
      self.history.push_back(label.to_string());
      while self.history.len() > self.required as usize {
        self.history.pop_front();
      }
      let count = self.match_count();
      debug!("目标 {} 稳定计数 {}/{}", target, count, self.required);
      if count >= self.required {
        self.completed = true;
        info!("目标 {} 完成", target);
        return TrackerEvent::Completed { target };
      }
      return TrackerEvent::Progress {
        count,
        required: self.required,
      };
    }

    if !matches && confident {
      debug!(
        "错误手势 {} ({:.0}%)，期望 {}，进度清零",
        label,
        prediction.confidence * 100.0,
        target
      );
      self.history.clear();
      return TrackerEvent::Reset {
        label: label.to_string(),
        confidence: prediction.confidence,
      };
    }

    let reason = if !confident {
      IgnoreReason::LowConfidence
    } else {
      IgnoreReason::Unstable
    };
    TrackerEvent::Ignored { reason }
  }
}

impl Default for PredictionTracker {
  fn default() -> Self {
    Self::new(DEFAULT_REQUIRED_STABILITY, DEFAULT_CONFIDENCE_THRESHOLD)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn p(label: &str, confidence: f32, stable: bool) -> PredictionResponse {
    PredictionResponse::ok(label, confidence, stable)
  }

  #[test]
  fn two_matches_complete_exactly_once() {
    let mut tracker = PredictionTracker::default().with_target("A");
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert_eq!(
      tracker.observe(&p("A", 0.65, true)),
      TrackerEvent::Progress {
        count: 1,
        required: 2
      }
    );
    assert_eq!(tracker.state(), TrackerState::Accumulating(1));
    assert_eq!(
      tracker.observe(&p("A", 0.70, true)),
      TrackerEvent::Completed { target: "A".into() }
    );
    assert_eq!(tracker.state(), TrackerState::Completed);
    // 迟到的预测不会再次完成
    assert_eq!(
      tracker.observe(&p("A", 0.99, true)),
      TrackerEvent::Ignored {
        reason: IgnoreReason::AlreadyCompleted
      }
    );
  }

  #[test]
  fn confident_wrong_label_resets() {
    let mut tracker = PredictionTracker::default().with_target("A");
    tracker.observe(&p("A", 0.65, true));
    assert!(matches!(
      tracker.observe(&p("B", 0.90, true)),
      TrackerEvent::Reset { .. }
    ));
    assert_eq!(tracker.state(), TrackerState::Idle);
  }

  #[test]
  fn low_confidence_match_neither_completes_nor_resets() {
    let mut tracker = PredictionTracker::default().with_target("A");
    tracker.observe(&p("A", 0.65, true));
    assert_eq!(
      tracker.observe(&p("A", 0.40, true)),
      TrackerEvent::Ignored {
        reason: IgnoreReason::LowConfidence
      }
    );
    assert_eq!(tracker.state(), TrackerState::Accumulating(1));
  }

  #[test]
  fn unstable_or_low_confidence_wrong_labels_are_ignored() {
    let mut tracker = PredictionTracker::default().with_target("A");
    tracker.observe(&p("A", 0.65, true));
    tracker.observe(&p("B", 0.30, true));
    tracker.observe(&p("A", 0.95, false));
    assert_eq!(tracker.state(), TrackerState::Accumulating(1));
  }

  #[test]
  fn failed_predictions_are_neutral() {
    let mut tracker = PredictionTracker::default().with_target("Hello");
    tracker.observe(&p("hello", 0.8, true));
    assert_eq!(
      tracker.observe(&PredictionResponse::failure("Model not loaded")),
      TrackerEvent::Ignored {
        reason: IgnoreReason::Unusable
      }
    );
    assert_eq!(tracker.state(), TrackerState::Accumulating(1));
    assert!(matches!(
      tracker.observe(&p("HELLO", 0.8, true)),
      TrackerEvent::Completed { .. }
    ));
  }

  #[test]
  fn changing_target_resets_progress() {
    let mut tracker = PredictionTracker::default().with_target("A");
    tracker.observe(&p("A", 0.9, true));
    tracker.set_target(Some("B"));
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert_eq!(tracker.target(), Some("B"));
  }

  #[test]
  fn without_target_everything_is_ignored() {
    let mut tracker = PredictionTracker::default();
    assert_eq!(
      tracker.observe(&p("A", 0.9, true)),
      TrackerEvent::Ignored {
        reason: IgnoreReason::NoTarget
      }
    );
  }
}
