// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classifier::{ConnectionEvent, Delivery},
  output::{Render, SessionEvent},
  tracker::TrackerEvent,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// `log://`，加 `?verbose` 时每帧状态也以 info 级别输出
pub struct LogOutput {
  verbose: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    let verbose = url.query_pairs().any(|(k, _)| k == "verbose");
    Ok(LogOutput { verbose })
  }
}

impl Render for LogOutput {
  type Error = LogOutputError;

  fn render_event(&self, event: &SessionEvent) -> Result<(), Self::Error> {
    match event {
      SessionEvent::Frame(status) => {
        if self.verbose {
          info!(
            "帧 t={}ms 手:{} 左:{} 右:{} 姿态:{} 稳定:{} 非零:{:.2} 缓冲:{}/{}",
            status.timestamp_ms,
            status.hands_detected,
            status.left_detected,
            status.right_detected,
            status.pose_detected,
            status.stable,
            status.nonzero_ratio,
            status.buffer_len,
            status.buffer_capacity
          );
        } else {
          debug!("帧 t={}ms 缓冲 {}/{}", status.timestamp_ms, status.buffer_len, status.buffer_capacity);
        }
      }
      SessionEvent::Sent {
        kind,
        frames,
        target,
        delivery,
      } => match delivery {
        Delivery::Sent => info!("发送 {} 请求: {} 帧, 目标 {:?}", kind, frames, target),
        Delivery::Dropped => warn!("未连接，{} 请求被丢弃", kind),
      },
      SessionEvent::Prediction(response) => match response.usable_label() {
        Some(label) => info!(
          "预测: {} ({:.0}%), 稳定: {}",
          label,
          response.confidence * 100.0,
          response.stable
        ),
        None => warn!("预测失败: {}", response.error.as_deref().unwrap_or("无标签")),
      },
      SessionEvent::Tracker { target, outcome } => match outcome {
        TrackerEvent::Progress { count, required } => {
          info!("目标 {:?} 进度 {}/{}", target, count, required)
        }
        TrackerEvent::Reset { label, confidence } => info!(
          "目标 {:?} 进度清零: 识别为 {} ({:.0}%)",
          target,
          label,
          confidence * 100.0
        ),
        TrackerEvent::Completed { target } => info!("完成手势 {}!", target),
        TrackerEvent::Ignored { reason } => debug!("预测被忽略: {:?}", reason),
      },
      SessionEvent::Connection(connection) => match connection {
        ConnectionEvent::Connected => info!("已连接分类服务"),
        ConnectionEvent::Disconnected => warn!("与分类服务断开"),
        ConnectionEvent::ConnectError { message } => warn!("连接分类服务失败: {}", message),
      },
      SessionEvent::Advanced { completed, next } => match next {
        Some(next) => info!("{} 已完成，下一个: {}", completed, next),
        None => info!("{} 已完成", completed),
      },
      SessionEvent::LessonComplete { targets } => info!("课程完成，共 {} 个手势", targets),
    }
    Ok(())
  }
}
