// 该文件是 Shouyu （手语） 项目的一部分。
// src/stability.rs - 手势静止检测
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

use crate::sequence::{SequenceWindow, Sliding};

pub const DEFAULT_STABILITY_WINDOW: usize = 3;
pub const DEFAULT_VARIANCE_THRESHOLD: f32 = 0.12;

/// 根据最近 K 帧的帧间漂移判断手是否保持静止。
///
/// 只度量运动，不关心手势内容。
#[derive(Debug, Clone)]
pub struct StabilityDetector {
  history: SequenceWindow<Sliding>,
  threshold: f32,
}

impl StabilityDetector {
  pub fn new(window: usize, threshold: f32) -> Self {
    Self {
      history: SequenceWindow::new(window.max(2)),
      threshold,
    }
  }

  /// 记录一帧并返回当前是否稳定
  pub fn observe(&mut self, features: &[f32]) -> bool {
    if features.is_empty() {
      return false;
    }
    self.history.push(features.to_vec());
    self.is_stable()
  }

  /// 历史不足 K 帧时恒为 false
  pub fn is_stable(&self) -> bool {
    match self.variance() {
      Some(v) => v < self.threshold,
      None => false,
    }
  }

  /// 当前窗口的平均帧间漂移，历史不足时为 `None`
  pub fn variance(&self) -> Option<f32> {
    if !self.history.is_full() {
      return None;
    }
    let frames: Vec<&Vec<f32>> = self.history.frames().collect();
    mean_frame_drift(&frames)
  }

  pub fn reset(&mut self) {
    self.history.clear();
  }

  pub fn len(&self) -> usize {
    self.history.len()
  }

  pub fn is_empty(&self) -> bool {
    self.history.is_empty()
  }

  pub fn window(&self) -> usize {
    self.history.capacity()
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }
}

impl Default for StabilityDetector {
  fn default() -> Self {
    Self::new(DEFAULT_STABILITY_WINDOW, DEFAULT_VARIANCE_THRESHOLD)
  }
}

/// 相邻帧逐元素绝对差的均值，再对 K-1 个间隔取平均。
///
/// 少于两帧时返回 `None`。长度不一致的帧按较短者比较。
pub fn mean_frame_drift<F: AsRef<[f32]>>(frames: &[F]) -> Option<f32> {
  if frames.len() < 2 {
    return None;
  }
  let gaps = frames.windows(2).map(|pair| {
    let (prev, curr) = (pair[0].as_ref(), pair[1].as_ref());
    let n = prev.len().min(curr.len());
    if n == 0 {
      return 0.0;
    }
    let sum: f32 = prev
      .iter()
      .zip(curr.iter())
      .map(|(a, b)| (b - a).abs())
      .sum();
    sum / n as f32
  });
  let total: f32 = gaps.sum();
  Some(total / (frames.len() - 1) as f32)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_history_is_never_stable() {
    let mut detector = StabilityDetector::default();
    assert!(!detector.observe(&[0.5; 63]));
    assert!(!detector.observe(&[0.5; 63]));
    assert_eq!(detector.variance(), None);
  }

  #[test]
  fn constant_vector_is_stable() {
    let mut detector = StabilityDetector::default();
    detector.observe(&[0.5; 63]);
    detector.observe(&[0.5; 63]);
    assert!(detector.observe(&[0.5; 63]));
    assert_eq!(detector.variance(), Some(0.0));
  }

  #[test]
  fn large_deltas_are_unstable() {
    let mut detector = StabilityDetector::default();
    detector.observe(&[0.0; 63]);
    detector.observe(&[0.5; 63]);
    assert!(!detector.observe(&[0.0; 63]));
    assert!((detector.variance().unwrap() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn reset_forgets_history() {
    let mut detector = StabilityDetector::default();
    for _ in 0..3 {
      detector.observe(&[0.2; 10]);
    }
    assert!(detector.is_stable());
    detector.reset();
    assert!(!detector.is_stable());
    assert!(detector.is_empty());
  }

  #[test]
  fn drift_averages_over_gaps() {
    let frames = [vec![0.0, 0.0], vec![0.2, 0.2], vec![0.2, 0.2]];
    let drift = mean_frame_drift(&frames).unwrap();
    assert!((drift - 0.1).abs() < 1e-6);
    assert_eq!(mean_frame_drift(&frames[..1]), None);
  }
}
