// 该文件是 Shouyu （手语） 项目的一部分。
// src/pipeline.rs - 单个课程视图的完整流水线
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

//! 检测结果 → 归一化 → 拼装 → 闸门 → 请求；预测 → 跟踪器 → 事件。
//!
//! 每个流水线独占自己的缓冲区与跟踪状态，多个模块可并行实例化，
//! 彼此之间没有共享的可变状态。流水线不是线程安全的，
//! 只能在单一的帧回调上下文中使用。

use serde::Serialize;
use tracing::{debug, info};

use crate::{
  feature::FeatureAssembler,
  gate::SendGate,
  landmark::TimedDetections,
  profile::{ModuleProfile, ProfileError},
  protocol::{PredictRequest, PredictionResponse},
  tracker::{PredictionTracker, TrackerEvent, TrackerState},
};

/// 每帧都会产生的界面状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStatus {
  pub timestamp_ms: u64,
  pub hands_detected: bool,
  pub left_detected: bool,
  pub right_detected: bool,
  pub pose_detected: bool,
  pub stable: bool,
  pub nonzero_ratio: f32,
  pub buffer_len: usize,
  pub buffer_capacity: usize,
  pub buffer_full: bool,
}

/// 一帧的处理结果
#[derive(Debug, Clone)]
pub struct FrameOutcome {
  pub status: FrameStatus,
  pub request: Option<PredictRequest>,
}

pub struct Pipeline {
  profile: ModuleProfile,
  assembler: FeatureAssembler,
  gate: SendGate,
  tracker: PredictionTracker,
  frames: u64,
  sent: u64,
}

impl Pipeline {
  pub fn new(profile: ModuleProfile) -> Result<Self, ProfileError> {
    profile.validate()?;
    info!(
      "创建流水线: 模块 {}, 特征长度 {}",
      profile.name,
      profile.layout.vector_len()
    );
    Ok(Self {
      assembler: FeatureAssembler::new(profile.layout.clone()),
      gate: profile.build_gate(),
      tracker: profile.build_tracker(),
      profile,
      frames: 0,
      sent: 0,
    })
  }

  pub fn profile(&self) -> &ModuleProfile {
    &self.profile
  }

  pub fn target(&self) -> Option<&str> {
    self.tracker.target()
  }

  pub fn tracker_state(&self) -> TrackerState {
    self.tracker.state()
  }

  pub fn frames_processed(&self) -> u64 {
    self.frames
  }

  pub fn requests_sent(&self) -> u64 {
    self.sent
  }

  /// 切换当前教学目标，清空进度并丢弃未发送的部分序列
  pub fn set_target(&mut self, target: Option<&str>) {
    debug!("切换目标: {:?} -> {:?}", self.tracker.target(), target);
    self.tracker.set_target(target);
    self.gate.discard_partial();
  }

  /// 处理一帧检测结果
  pub fn on_frame(&mut self, frame: &TimedDetections) -> FrameOutcome {
    self.frames += 1;
    let sample = self.assembler.assemble(frame);
    let decision = self.gate.decide(&sample);

    let status = FrameStatus {
      timestamp_ms: sample.timestamp_ms,
      hands_detected: sample.hands_detected(),
      left_detected: sample.left_detected,
      right_detected: sample.right_detected,
      pose_detected: sample.pose_detected,
      stable: decision.stable,
      nonzero_ratio: decision.nonzero_ratio,
      buffer_len: decision.buffer_len,
      buffer_capacity: decision.buffer_capacity,
      buffer_full: decision.buffer_len >= decision.buffer_capacity,
    };

    let request = decision.payload.map(|payload| {
      self.sent += 1;
      let target = if self.profile.send_target {
        self.tracker.target().map(String::from)
      } else {
        None
      };
      PredictRequest::from_payload(payload, target)
    });

    FrameOutcome { status, request }
  }

  /// 处理一次后端预测
  pub fn on_prediction(&mut self, prediction: &PredictionResponse) -> TrackerEvent {
    self.tracker.observe(prediction)
  }

  /// 摄像头（重新）启动：不把旧缓冲带入新会话
  pub fn restart(&mut self) {
    info!("流水线 {} 重置缓冲区", self.profile.name);
    self.gate.reset();
  }

  /// 停止会话：丢弃所有未发送的缓冲与进度
  pub fn stop(&mut self) {
    self.gate.reset();
    self.tracker.reset();
  }
}
