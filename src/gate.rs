// 该文件是 Shouyu （手语） 项目的一部分。
// src/gate.rs - 发送闸门
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

//! 逐帧决定是否把特征发给后端分类器。
//!
//! 闸门是唯一会因自身决策而修改稳定性历史与序列窗口的组件：
//! 发送后清空序列窗口，无手时重置稳定性历史与强制发送计数。

use tracing::debug;

use crate::{
  landmark::FrameSample,
  sequence::{Cycle, SequenceWindow},
  stability::StabilityDetector,
};

/// 发送给后端的载荷
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  /// 单帧特征
  Landmarks(Vec<f32>),
  /// 整段序列，长度为窗口容量
  Sequence(Vec<Vec<f32>>),
}

impl Payload {
  pub fn frame_count(&self) -> usize {
    match self {
      Payload::Landmarks(_) => 1,
      Payload::Sequence(seq) => seq.len(),
    }
  }
}

/// 两次发送之间的最小时间间隔，以帧时间戳计
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
  period_ms: u64,
  last_send_ms: Option<u64>,
}

impl Cooldown {
  pub fn new(period_ms: u64) -> Self {
    Self {
      period_ms,
      last_send_ms: None,
    }
  }

  /// 时间戳回退（检测器重启、录像拼接）视为时钟重置，冷却立即结束
  pub fn elapsed(&self, now_ms: u64) -> bool {
    match self.last_send_ms {
      None => true,
      Some(last) if now_ms < last => true,
      Some(last) => now_ms - last >= self.period_ms,
    }
  }

  pub fn mark(&mut self, now_ms: u64) {
    self.last_send_ms = Some(now_ms);
  }

  pub fn reset(&mut self) {
    self.last_send_ms = None;
  }
}

/// 单帧闸门的判定结果
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
  pub present: bool,
  pub stable: bool,
  pub nonzero_ratio: f32,
  pub buffer_len: usize,
  pub buffer_capacity: usize,
  pub payload: Option<Payload>,
}

/// 静态手势模块：稳定或连续有手时发送单帧
#[derive(Debug, Clone)]
pub struct DiscreteGate {
  stability: StabilityDetector,
  min_nonzero_ratio: f32,
  force_send_frames: u32,
  force_send_margin: f32,
  frames_with_hand: u32,
  cooldown: Cooldown,
}

impl DiscreteGate {
  pub fn new(
    stability: StabilityDetector,
    min_nonzero_ratio: f32,
    force_send_frames: u32,
    force_send_margin: f32,
    cooldown_ms: u64,
  ) -> Self {
    Self {
      stability,
      min_nonzero_ratio,
      force_send_frames,
      force_send_margin,
      frames_with_hand: 0,
      cooldown: Cooldown::new(cooldown_ms),
    }
  }

  pub fn decide(&mut self, sample: &FrameSample) -> GateDecision {
    let ratio = sample.nonzero_ratio();
    let present = ratio > self.min_nonzero_ratio;

    if !present {
      self.frames_with_hand = 0;
      self.stability.reset();
      return GateDecision {
        present,
        stable: false,
        nonzero_ratio: ratio,
        buffer_len: 0,
        buffer_capacity: self.stability.window(),
        payload: None,
      };
    }

    let stable = self.stability.observe(&sample.features);
    self.frames_with_hand = self.frames_with_hand.saturating_add(1);

    let forced = self.frames_with_hand >= self.force_send_frames
      && ratio > self.min_nonzero_ratio + self.force_send_margin;
    let send = self.cooldown.elapsed(sample.timestamp_ms) && (stable || forced);

    let payload = if send {
      self.cooldown.mark(sample.timestamp_ms);
      debug!(
        "发送单帧特征: 长度 {}, 非零比例 {:.2}, 稳定 {}, 连续有手帧 {}",
        sample.features.len(),
        ratio,
        stable,
        self.frames_with_hand
      );
      Some(Payload::Landmarks(sample.features.clone()))
    } else {
      None
    };

    GateDecision {
      present,
      stable,
      nonzero_ratio: ratio,
      buffer_len: self.stability.len(),
      buffer_capacity: self.stability.window(),
      payload,
    }
  }

  pub fn reset(&mut self) {
    self.stability.reset();
    self.frames_with_hand = 0;
    self.cooldown.reset();
  }

  pub fn frames_with_hand(&self) -> u32 {
    self.frames_with_hand
  }
}

/// 时序手势模块：窗口装满后整段发送并清空
#[derive(Debug, Clone)]
pub struct SequenceGate {
  window: SequenceWindow<Cycle>,
  min_nonzero_ratio: f32,
  require_pose: bool,
  reset_on_absence: bool,
  cooldown: Cooldown,
}

impl SequenceGate {
  pub fn new(
    length: usize,
    min_nonzero_ratio: f32,
    require_pose: bool,
    reset_on_absence: bool,
    cooldown_ms: u64,
  ) -> Self {
    Self {
      window: SequenceWindow::new(length),
      min_nonzero_ratio,
      require_pose,
      reset_on_absence,
      cooldown: Cooldown::new(cooldown_ms),
    }
  }

  pub fn decide(&mut self, sample: &FrameSample) -> GateDecision {
    let ratio = sample.nonzero_ratio();

    if self.require_pose && !sample.pose_detected {
      if self.reset_on_absence && !self.window.is_empty() {
        debug!("未检测到姿态，丢弃未完成的序列 ({} 帧)", self.window.len());
        self.window.clear();
      }
      return GateDecision {
        present: false,
        stable: false,
        nonzero_ratio: ratio,
        buffer_len: self.window.len(),
        buffer_capacity: self.window.capacity(),
        payload: None,
      };
    }

    self.window.push(sample.features.clone());
    let present = ratio > self.min_nonzero_ratio;

    let payload = if present && self.cooldown.elapsed(sample.timestamp_ms) {
      self.window.take_full().map(|sequence| {
        self.cooldown.mark(sample.timestamp_ms);
        debug!(
          "发送序列: {} 帧, 非零比例 {:.2}",
          sequence.len(),
          ratio
        );
        Payload::Sequence(sequence)
      })
    } else {
      None
    };

    GateDecision {
      present,
      stable: false,
      nonzero_ratio: ratio,
      buffer_len: self.window.len(),
      buffer_capacity: self.window.capacity(),
      payload,
    }
  }

  /// 丢弃未发送的部分序列
  pub fn discard(&mut self) {
    self.window.clear();
  }

  pub fn reset(&mut self) {
    self.window.clear();
    self.cooldown.reset();
  }

  pub fn buffered(&self) -> usize {
    self.window.len()
  }
}

/// 模块所用的闸门
#[derive(Debug, Clone)]
pub enum SendGate {
  Discrete(DiscreteGate),
  Sequence(SequenceGate),
}

impl SendGate {
  pub fn decide(&mut self, sample: &FrameSample) -> GateDecision {
    match self {
      SendGate::Discrete(gate) => gate.decide(sample),
      SendGate::Sequence(gate) => gate.decide(sample),
    }
  }

  /// 摄像头重启或会话停止时调用
  pub fn reset(&mut self) {
    match self {
      SendGate::Discrete(gate) => gate.reset(),
      SendGate::Sequence(gate) => gate.reset(),
    }
  }

  /// 切换目标时丢弃尚未发送的部分序列
  pub fn discard_partial(&mut self) {
    if let SendGate::Sequence(gate) = self {
      gate.discard();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample(features: Vec<f32>, timestamp_ms: u64) -> FrameSample {
    FrameSample {
      features,
      timestamp_ms,
      left_detected: false,
      right_detected: true,
      pose_detected: true,
    }
  }

  fn discrete() -> DiscreteGate {
    DiscreteGate::new(StabilityDetector::default(), 0.25, 4, 0.05, 350)
  }

  #[test]
  fn discrete_never_sends_below_ratio_floor() {
    let mut gate = discrete();
    // 三帧相同且满足比例，历史已稳定
    for t in 0..3 {
      gate.decide(&sample(vec![0.5; 10], t * 10));
    }
    // 比例 0.2 < 0.25，即使历史中是稳定的也不能发送
    let mut sparse = vec![0.0; 10];
    sparse[0] = 0.5;
    sparse[1] = 0.5;
    for t in 0..10 {
      let decision = gate.decide(&sample(sparse.clone(), 10_000 + t * 1000));
      assert!(decision.payload.is_none());
      assert!(!decision.present);
      assert!(!decision.stable);
    }
    assert_eq!(gate.frames_with_hand(), 0);
  }

  #[test]
  fn discrete_sends_once_stable_and_respects_cooldown() {
    let mut gate = discrete();
    assert!(gate.decide(&sample(vec![0.5; 10], 0)).payload.is_none());
    assert!(gate.decide(&sample(vec![0.5; 10], 33)).payload.is_none());
    let third = gate.decide(&sample(vec![0.5; 10], 66));
    assert!(third.stable);
    assert_eq!(third.payload, Some(Payload::Landmarks(vec![0.5; 10])));

    // 冷却期内不发送
    assert!(gate.decide(&sample(vec![0.5; 10], 100)).payload.is_none());
    assert!(gate.decide(&sample(vec![0.5; 10], 415)).payload.is_none());
    assert!(gate.decide(&sample(vec![0.5; 10], 416)).payload.is_some());
  }

  #[test]
  fn cooldown_treats_backward_clock_as_reset() {
    let mut cooldown = Cooldown::new(350);
    cooldown.mark(600_000);
    assert!(!cooldown.elapsed(600_100));
    assert!(cooldown.elapsed(0));
    assert!(cooldown.elapsed(599_999));
  }

  #[test]
  fn discrete_keeps_sending_after_timestamps_restart() {
    let mut gate = discrete();
    let sent = (0..3u64)
      .filter(|t| gate.decide(&sample(vec![0.5; 10], 600_000 + t * 33)).payload.is_some())
      .count();
    assert_eq!(sent, 1);

    // 检测器重启后时间戳从 0 开始
    let sent = (0..300u64)
      .filter(|t| gate.decide(&sample(vec![0.5; 10], t * 33)).payload.is_some())
      .count();
    assert!(sent > 1);
  }

  #[test]
  fn discrete_force_sends_moving_hand_after_floor() {
    let mut gate = discrete();
    let mut sent = Vec::new();
    for t in 0..6u64 {
      let v = if t % 2 == 0 { 0.1 } else { 0.9 };
      let decision = gate.decide(&sample(vec![v; 10], t * 100));
      assert!(!decision.stable);
      sent.push(decision.payload.is_some());
    }
    // 第 4 帧起达到强制发送下限，之后仍受冷却约束
    assert_eq!(sent, vec![false, false, false, true, false, false]);
  }

  #[test]
  fn discrete_force_send_requires_margin() {
    let mut gate = discrete();
    // 比例 0.28：高于下限 0.25，但不高于 0.30
    let mut features = vec![0.0; 100];
    for t in 0..8u64 {
      for f in features.iter_mut().take(28) {
        *f = if t % 2 == 0 { 0.1 } else { 0.9 };
      }
      let decision = gate.decide(&sample(features.clone(), t * 1000));
      assert!(decision.present);
      assert!(decision.payload.is_none());
    }
  }

  #[test]
  fn sequence_sends_full_window_and_clears() {
    let mut gate = SequenceGate::new(5, 0.2, false, false, 1000);
    for t in 0..4u64 {
      let decision = gate.decide(&sample(vec![0.5; 4], 5000 + t * 33));
      assert!(decision.payload.is_none());
      assert_eq!(decision.buffer_len, t as usize + 1);
    }
    let decision = gate.decide(&sample(vec![0.5; 4], 5000 + 4 * 33));
    match decision.payload {
      Some(Payload::Sequence(seq)) => assert_eq!(seq.len(), 5),
      other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(decision.buffer_len, 0);
    assert_eq!(gate.buffered(), 0);
  }

  #[test]
  fn sequence_waits_for_cooldown_while_sliding_at_capacity() {
    let mut gate = SequenceGate::new(2, 0.2, false, false, 1000);
    gate.decide(&sample(vec![0.5; 4], 0));
    assert!(gate.decide(&sample(vec![0.5; 4], 10)).payload.is_some());
    gate.decide(&sample(vec![0.5; 4], 20));
    let decision = gate.decide(&sample(vec![0.5; 4], 30));
    assert!(decision.payload.is_none());
    assert_eq!(decision.buffer_len, 2);
    gate.decide(&sample(vec![0.5; 4], 500));
    assert_eq!(gate.buffered(), 2);
    assert!(gate.decide(&sample(vec![0.5; 4], 1010)).payload.is_some());
  }

  #[test]
  fn sequence_does_not_send_sparse_frame() {
    let mut gate = SequenceGate::new(2, 0.2, false, false, 0);
    gate.decide(&sample(vec![0.5; 4], 0));
    let decision = gate.decide(&sample(vec![0.0; 4], 10));
    assert!(decision.payload.is_none());
    assert!(!decision.present);
    assert_eq!(decision.buffer_len, 2);
  }

  #[test]
  fn sequence_requiring_pose_resets_on_absence() {
    let mut gate = SequenceGate::new(3, 0.0, true, true, 0);
    gate.decide(&sample(vec![0.5; 4], 0));
    gate.decide(&sample(vec![0.5; 4], 10));
    assert_eq!(gate.buffered(), 2);
    let mut no_pose = sample(vec![0.5; 4], 20);
    no_pose.pose_detected = false;
    let decision = gate.decide(&no_pose);
    assert!(!decision.present);
    assert_eq!(decision.buffer_len, 0);
  }
}
