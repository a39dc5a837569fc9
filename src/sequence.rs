// 该文件是 Shouyu （手语） 项目的一部分。
// src/sequence.rs - 定长时间序列窗口
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

//! 两种窗口用法在类型上区分：
//!
//! - [`Cycle`]：装满后整体取出并清空，形成“采样、预测、重来”的节奏；
//! - [`Sliding`]：装满后新帧挤掉最旧帧，用于连续的稳定性度量。
//!
//! 只有 `SequenceWindow<Cycle>` 提供 [`SequenceWindow::take_full`]，
//! 同一个窗口不可能混用两种策略。

use std::collections::VecDeque;
use std::marker::PhantomData;

pub trait WindowMode {}

/// 整窗发送后清空
#[derive(Debug, Clone, Copy)]
pub struct Cycle;

/// 固定大小滑动
#[derive(Debug, Clone, Copy)]
pub struct Sliding;

impl WindowMode for Cycle {}
impl WindowMode for Sliding {}

/// 容量为 C 的特征向量 FIFO 队列
#[derive(Debug, Clone)]
pub struct SequenceWindow<M: WindowMode> {
  frames: VecDeque<Vec<f32>>,
  capacity: usize,
  _mode: PhantomData<M>,
}

impl<M: WindowMode> SequenceWindow<M> {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      frames: VecDeque::with_capacity(capacity + 1),
      capacity,
      _mode: PhantomData,
    }
  }

  /// 追加一帧，超出容量时丢弃最旧的一帧
  pub fn push(&mut self, features: Vec<f32>) {
    self.frames.push_back(features);
    while self.frames.len() > self.capacity {
      self.frames.pop_front();
    }
  }

  pub fn is_full(&self) -> bool {
    self.frames.len() == self.capacity
  }

  pub fn clear(&mut self) {
    self.frames.clear();
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn frames(&self) -> impl Iterator<Item = &Vec<f32>> {
    self.frames.iter()
  }
}

impl SequenceWindow<Cycle> {
  /// 窗口满时取出全部帧并清空为 0 帧，未满时不做任何改动
  pub fn take_full(&mut self) -> Option<Vec<Vec<f32>>> {
    if !self.is_full() {
      return None;
    }
    Some(self.frames.drain(..).collect())
  }
}

impl SequenceWindow<Sliding> {
  /// 最近的 `n` 帧，按时间先后排列
  pub fn latest(&self, n: usize) -> impl Iterator<Item = &Vec<f32>> {
    let skip = self.frames.len().saturating_sub(n);
    self.frames.iter().skip(skip)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cycle_window_fills_then_clears_to_zero() {
    let mut window: SequenceWindow<Cycle> = SequenceWindow::new(30);
    for i in 0..30 {
      assert!(!window.is_full());
      window.push(vec![i as f32]);
    }
    assert!(window.is_full());

    window.push(vec![30.0]);
    assert_eq!(window.len(), 30);
    window.clear();
    assert_eq!(window.len(), 0);
  }

  #[test]
  fn take_full_only_when_full() {
    let mut window: SequenceWindow<Cycle> = SequenceWindow::new(3);
    window.push(vec![1.0]);
    window.push(vec![2.0]);
    assert!(window.take_full().is_none());
    assert_eq!(window.len(), 2);

    window.push(vec![3.0]);
    let frames = window.take_full().unwrap();
    assert_eq!(frames, vec![vec![1.0], vec![2.0], vec![3.0]]);
    assert!(window.is_empty());
  }

  #[test]
  fn sliding_window_evicts_oldest() {
    let mut window: SequenceWindow<Sliding> = SequenceWindow::new(3);
    for i in 0..5 {
      window.push(vec![i as f32]);
    }
    assert!(window.is_full());
    let kept: Vec<f32> = window.frames().map(|f| f[0]).collect();
    assert_eq!(kept, vec![2.0, 3.0, 4.0]);
    let last_two: Vec<f32> = window.latest(2).map(|f| f[0]).collect();
    assert_eq!(last_two, vec![3.0, 4.0]);
  }
}
