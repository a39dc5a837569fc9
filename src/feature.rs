// 该文件是 Shouyu （手语） 项目的一部分。
// src/feature.rs - 特征向量拼装
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

//! 特征向量的部位顺序与长度是与分类模型之间的契约：
//! 顺序或长度不一致不会报错，只会得到错误的预测结果。

use serde::{Deserialize, Serialize};

use crate::{
  landmark::{
    Detections, FACE_LANDMARKS, FrameSample, HAND_LANDMARKS, POSE_LANDMARKS, TimedDetections,
  },
  normalize::{NormalizePolicy, normalize},
};

/// 参与拼装的身体部位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyPart {
  Face,
  Pose,
  LeftHand,
  RightHand,
  /// 单手模块：优先右手，右手缺失时取左手，从不同时输出两只手
  DominantHand,
}

impl BodyPart {
  pub fn cardinality(&self) -> usize {
    match self {
      BodyPart::Face => FACE_LANDMARKS,
      BodyPart::Pose => POSE_LANDMARKS,
      BodyPart::LeftHand | BodyPart::RightHand | BodyPart::DominantHand => HAND_LANDMARKS,
    }
  }
}

/// 模块固定的特征布局
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLayout {
  pub parts: Vec<BodyPart>,
  #[serde(default)]
  pub normalize: NormalizePolicy,
}

impl FeatureLayout {
  pub fn new(parts: Vec<BodyPart>, normalize: NormalizePolicy) -> Self {
    Self { parts, normalize }
  }

  pub fn single_hand(normalize: NormalizePolicy) -> Self {
    Self::new(vec![BodyPart::DominantHand], normalize)
  }

  pub fn two_hands(normalize: NormalizePolicy) -> Self {
    Self::new(vec![BodyPart::LeftHand, BodyPart::RightHand], normalize)
  }

  pub fn holistic(normalize: NormalizePolicy) -> Self {
    Self::new(
      vec![
        BodyPart::Face,
        BodyPart::Pose,
        BodyPart::LeftHand,
        BodyPart::RightHand,
      ],
      normalize,
    )
  }

  /// 特征向量长度
  pub fn vector_len(&self) -> usize {
    self.parts.iter().map(|p| p.cardinality() * 3).sum()
  }
}

/// 按布局把一帧检测结果拼成定长特征向量
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
  layout: FeatureLayout,
}

impl FeatureAssembler {
  pub fn new(layout: FeatureLayout) -> Self {
    Self { layout }
  }

  pub fn layout(&self) -> &FeatureLayout {
    &self.layout
  }

  pub fn assemble(&self, frame: &TimedDetections) -> FrameSample {
    let detections = &frame.detections;
    let (left, right) = detections.split_hands();
    let policy = self.layout.normalize;

    let mut features = Vec::with_capacity(self.layout.vector_len());
    for part in &self.layout.parts {
      let block = match part {
        BodyPart::Face => normalize(detections.face.as_deref(), FACE_LANDMARKS, policy),
        BodyPart::Pose => normalize(detections.pose.as_deref(), POSE_LANDMARKS, policy),
        BodyPart::LeftHand => normalize(left, HAND_LANDMARKS, policy),
        BodyPart::RightHand => normalize(right, HAND_LANDMARKS, policy),
        BodyPart::DominantHand => Self::dominant_hand(left, right, policy),
      };
      features.extend_from_slice(&block);
    }
    debug_assert_eq!(features.len(), self.layout.vector_len());

    FrameSample {
      features,
      timestamp_ms: frame.timestamp_ms,
      left_detected: left.is_some(),
      right_detected: right.is_some(),
      pose_detected: detections.has_pose(),
    }
  }

  fn dominant_hand(
    left: Option<&[crate::landmark::Landmark]>,
    right: Option<&[crate::landmark::Landmark]>,
    policy: NormalizePolicy,
  ) -> Vec<f32> {
    let right = normalize(right, HAND_LANDMARKS, policy);
    if right.iter().any(|v| *v != 0.0) {
      right
    } else {
      normalize(left, HAND_LANDMARKS, policy)
    }
  }

  /// 便捷方法：不关心时间戳时直接拼装
  pub fn assemble_detections(&self, detections: &Detections) -> Vec<f32> {
    self
      .assemble(&TimedDetections {
        timestamp_ms: 0,
        detections: detections.clone(),
      })
      .features
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::landmark::{DetectedHand, Landmark};

  fn hand(label: Option<&str>, x0: f32) -> DetectedHand {
    DetectedHand {
      handedness: label.map(String::from),
      landmarks: (0..HAND_LANDMARKS)
        .map(|i| Landmark::new(x0 + i as f32 * 0.01, 0.5 + i as f32 * 0.005, 0.0))
        .collect(),
    }
  }

  #[test]
  fn vector_lengths_match_module_contracts() {
    assert_eq!(FeatureLayout::single_hand(NormalizePolicy::BboxOffset).vector_len(), 63);
    assert_eq!(FeatureLayout::two_hands(NormalizePolicy::BboxOffset).vector_len(), 126);
    assert_eq!(FeatureLayout::holistic(NormalizePolicy::Raw).vector_len(), 1629);
  }

  #[test]
  fn empty_frame_yields_zero_vector_of_fixed_length() {
    let assembler = FeatureAssembler::new(FeatureLayout::holistic(NormalizePolicy::Raw));
    let sample = assembler.assemble(&TimedDetections::default());
    assert_eq!(sample.features.len(), 1629);
    assert!(sample.features.iter().all(|v| *v == 0.0));
    assert!(!sample.hands_detected());
    assert!(!sample.pose_detected);
  }

  #[test]
  fn two_hand_layout_places_left_before_right() {
    let assembler = FeatureAssembler::new(FeatureLayout::two_hands(NormalizePolicy::Raw));
    let detections = Detections {
      hands: vec![hand(Some("Right"), 0.6), hand(Some("Left"), 0.1)],
      ..Default::default()
    };
    let features = assembler.assemble_detections(&detections);
    assert_eq!(features.len(), 126);
    assert!((features[0] - 0.1).abs() < 1e-6);
    assert!((features[63] - 0.6).abs() < 1e-6);
  }

  #[test]
  fn single_hand_prefers_right_and_never_emits_both() {
    let assembler = FeatureAssembler::new(FeatureLayout::single_hand(NormalizePolicy::Raw));
    let both = Detections {
      hands: vec![hand(Some("Left"), 0.1), hand(Some("Right"), 0.6)],
      ..Default::default()
    };
    let features = assembler.assemble_detections(&both);
    assert_eq!(features.len(), 63);
    assert!((features[0] - 0.6).abs() < 1e-6);

    let left_only = Detections {
      hands: vec![hand(Some("Left"), 0.1)],
      ..Default::default()
    };
    let features = assembler.assemble_detections(&left_only);
    assert!((features[0] - 0.1).abs() < 1e-6);
  }

  #[test]
  fn holistic_block_order_is_face_pose_left_right() {
    let assembler = FeatureAssembler::new(FeatureLayout::holistic(NormalizePolicy::Raw));
    let detections = Detections {
      pose: Some(vec![Landmark::new(0.7, 0.7, 0.7); POSE_LANDMARKS]),
      hands: vec![hand(Some("Right"), 0.3)],
      ..Default::default()
    };
    let sample = assembler.assemble(&TimedDetections {
      timestamp_ms: 42,
      detections,
    });
    let face_end = FACE_LANDMARKS * 3;
    let pose_end = face_end + POSE_LANDMARKS * 3;
    let left_end = pose_end + HAND_LANDMARKS * 3;
    assert!(sample.features[..face_end].iter().all(|v| *v == 0.0));
    assert!((sample.features[face_end] - 0.7).abs() < 1e-6);
    assert!(sample.features[pose_end..left_end].iter().all(|v| *v == 0.0));
    assert!((sample.features[left_end] - 0.3).abs() < 1e-6);
    assert_eq!(sample.timestamp_ms, 42);
    assert!(sample.pose_detected && sample.right_detected && !sample.left_detected);
  }
}
