// 该文件是 Shouyu （手语） 项目的一部分。
// src/landmark.rs - 关键点与单帧检测结果定义
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

use serde::{Deserialize, Serialize};

pub const FACE_LANDMARKS: usize = 468;
pub const POSE_LANDMARKS: usize = 33;
pub const HAND_LANDMARKS: usize = 21;

/// 单个关键点，坐标为图像归一化坐标
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
  pub x: f32,
  pub y: f32,
  #[serde(default)]
  pub z: f32,
}

impl Landmark {
  pub const ZERO: Landmark = Landmark {
    x: 0.0,
    y: 0.0,
    z: 0.0,
  };

  pub fn new(x: f32, y: f32, z: f32) -> Self {
    Self { x, y, z }
  }

  /// 非有限值一律视为 0
  pub fn sanitized(self) -> Self {
    fn finite(v: f32) -> f32 {
      if v.is_finite() { v } else { 0.0 }
    }
    Self {
      x: finite(self.x),
      y: finite(self.y),
      z: finite(self.z),
    }
  }
}

/// 手的左右标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
  Left,
  Right,
}

impl Handedness {
  /// 未知或缺失的标签按 "Right" 处理
  pub fn from_label(label: Option<&str>) -> Self {
    match label {
      Some(l) if l.eq_ignore_ascii_case("left") => Handedness::Left,
      _ => Handedness::Right,
    }
  }
}

/// 一只被检测到的手
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedHand {
  #[serde(default)]
  pub handedness: Option<String>,
  pub landmarks: Vec<Landmark>,
}

impl DetectedHand {
  pub fn side(&self) -> Handedness {
    Handedness::from_label(self.handedness.as_deref())
  }
}

/// 检测器给出的一帧原始结果，缺失的部位为 `None` 或空列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
  #[serde(default)]
  pub face: Option<Vec<Landmark>>,
  #[serde(default)]
  pub pose: Option<Vec<Landmark>>,
  #[serde(default)]
  pub hands: Vec<DetectedHand>,
}

impl Detections {
  pub fn has_pose(&self) -> bool {
    self.pose.as_ref().is_some_and(|p| !p.is_empty())
  }

  pub fn has_hands(&self) -> bool {
    self.hands.iter().any(|h| !h.landmarks.is_empty())
  }

  /// 按左右标签拆分手部，同侧出现多只手时后者覆盖前者
  pub fn split_hands(&self) -> (Option<&[Landmark]>, Option<&[Landmark]>) {
    let mut left = None;
    let mut right = None;
    for hand in self.hands.iter().filter(|h| !h.landmarks.is_empty()) {
      match hand.side() {
        Handedness::Left => left = Some(hand.landmarks.as_slice()),
        Handedness::Right => right = Some(hand.landmarks.as_slice()),
      }
    }
    (left, right)
  }
}

/// 带时间戳的一帧检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimedDetections {
  pub timestamp_ms: u64,
  pub detections: Detections,
}

/// 一帧的特征向量与检测标志，创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
  pub features: Vec<f32>,
  pub timestamp_ms: u64,
  pub left_detected: bool,
  pub right_detected: bool,
  pub pose_detected: bool,
}

impl FrameSample {
  pub fn hands_detected(&self) -> bool {
    self.left_detected || self.right_detected
  }

  /// 非零元素比例，作为检测置信度的近似
  pub fn nonzero_ratio(&self) -> f32 {
    nonzero_ratio(&self.features)
  }
}

pub fn nonzero_ratio(features: &[f32]) -> f32 {
  if features.is_empty() {
    return 0.0;
  }
  features.iter().filter(|v| **v != 0.0).count() as f32 / features.len() as f32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_handedness_defaults_to_right() {
    assert_eq!(Handedness::from_label(None), Handedness::Right);
    assert_eq!(Handedness::from_label(Some("Left")), Handedness::Left);
    assert_eq!(Handedness::from_label(Some("unknown")), Handedness::Right);
  }

  #[test]
  fn later_hand_of_same_side_wins() {
    let first = DetectedHand {
      handedness: Some("Right".into()),
      landmarks: vec![Landmark::new(0.1, 0.1, 0.0)],
    };
    let second = DetectedHand {
      handedness: None,
      landmarks: vec![Landmark::new(0.9, 0.9, 0.0)],
    };
    let detections = Detections {
      hands: vec![first, second],
      ..Default::default()
    };
    let (left, right) = detections.split_hands();
    assert!(left.is_none());
    assert_eq!(right.unwrap()[0].x, 0.9);
  }

  #[test]
  fn nonzero_ratio_of_empty_is_zero() {
    assert_eq!(nonzero_ratio(&[]), 0.0);
    assert_eq!(nonzero_ratio(&[0.0, 1.0, 0.0, 2.0]), 0.5);
  }

  #[test]
  fn sanitized_replaces_nan() {
    let lm = Landmark::new(f32::NAN, 0.5, f32::INFINITY).sanitized();
    assert_eq!(lm, Landmark::new(0.0, 0.5, 0.0));
  }
}
