// 该文件是 Shouyu （手语） 项目的一部分。
// src/input.rs - 关键点帧输入
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

use std::{
  collections::HashMap,
  io::{BufRead, Lines},
  thread,
  time::{Duration, Instant},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl,
  landmark::{DetectedHand, Detections, Landmark, TimedDetections},
};

#[cfg(feature = "landmark_file_input")]
mod landmark_file;
#[cfg(feature = "landmark_file_input")]
pub use self::landmark_file::{LandmarkFileInput, LandmarkFileInputError};

mod landmark_stdin;
pub use self::landmark_stdin::{LandmarkStdinInput, LandmarkStdinInputError};

pub const DEFAULT_FPS: f64 = 30.0;

/// 检测器输出的一行记录
///
/// 同时接受 `hands` 列表与整体模型的 `left_hand` / `right_hand` 字段。
#[derive(Debug, Deserialize)]
struct LandmarkRecord {
  #[serde(default)]
  timestamp_ms: Option<u64>,
  #[serde(flatten)]
  detections: Detections,
  #[serde(default)]
  left_hand: Option<Vec<Landmark>>,
  #[serde(default)]
  right_hand: Option<Vec<Landmark>>,
}

impl LandmarkRecord {
  fn into_timed(self, fallback_ms: u64) -> TimedDetections {
    let mut detections = self.detections;
    for (label, hand) in [("Left", self.left_hand), ("Right", self.right_hand)] {
      if let Some(landmarks) = hand {
        detections.hands.push(DetectedHand {
          handedness: Some(label.to_string()),
          landmarks,
        });
      }
    }
    TimedDetections {
      timestamp_ms: self.timestamp_ms.unwrap_or(fallback_ms),
      detections,
    }
  }
}

/// 解析一行记录；缺少时间戳时使用 `fallback_ms`
pub fn parse_frame_line(line: &str, fallback_ms: u64) -> Result<TimedDetections, serde_json::Error> {
  let record: LandmarkRecord = serde_json::from_str(line)?;
  Ok(record.into_timed(fallback_ms))
}

/// 帧节奏选项，来自 URL 查询参数 `fps` 与 `realtime`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
  pub frame_interval_ms: u64,
  pub realtime: bool,
}

impl Default for Pacing {
  fn default() -> Self {
    Self {
      frame_interval_ms: (1000.0 / DEFAULT_FPS).round() as u64,
      realtime: false,
    }
  }
}

impl Pacing {
  /// 非法的 `fps` 返回 `Err((key, value))`
  pub fn from_query(query: &HashMap<String, String>) -> Result<Self, (String, String)> {
    let mut pacing = Pacing::default();
    if let Some(value) = query.get("fps") {
      match value.parse::<f64>() {
        Ok(fps) if fps > 0.0 && fps.is_finite() => {
          pacing.frame_interval_ms = (1000.0 / fps).round().max(1.0) as u64;
        }
        _ => return Err(("fps".to_string(), value.clone())),
      }
    }
    pacing.realtime = query
      .get("realtime")
      .map(|v| v.is_empty() || v == "true" || v == "1")
      .unwrap_or(false);
    Ok(pacing)
  }
}

/// 逐行读取关键点帧，无法解析的行记录警告后跳过
pub struct LandmarkLines<R: BufRead> {
  lines: Lines<R>,
  pacing: Pacing,
  line_number: usize,
  frame_index: u64,
  clock: Option<(Instant, u64)>,
}

impl<R: BufRead> LandmarkLines<R> {
  pub fn new(reader: R, pacing: Pacing) -> Self {
    Self {
      lines: reader.lines(),
      pacing,
      line_number: 0,
      frame_index: 0,
      clock: None,
    }
  }

  fn pace(&mut self, timestamp_ms: u64) {
    let (start, first_ms) = *self
      .clock
      .get_or_insert_with(|| (Instant::now(), timestamp_ms));
    let due = Duration::from_millis(timestamp_ms.saturating_sub(first_ms));
    let elapsed = start.elapsed();
    if due > elapsed {
      thread::sleep(due - elapsed);
    }
  }
}

impl<R: BufRead> Iterator for LandmarkLines<R> {
  type Item = TimedDetections;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let line = match self.lines.next()? {
        Ok(line) => line,
        Err(e) => {
          warn!("读取输入失败，结束输入: {}", e);
          return None;
        }
      };
      self.line_number += 1;
      if line.trim().is_empty() {
        continue;
      }

      let fallback_ms = self.frame_index * self.pacing.frame_interval_ms;
      match parse_frame_line(&line, fallback_ms) {
        Ok(frame) => {
          self.frame_index += 1;
          if self.pacing.realtime {
            self.pace(frame.timestamp_ms);
          }
          debug!("读取第 {} 帧 (t={}ms)", self.frame_index, frame.timestamp_ms);
          return Some(frame);
        }
        Err(e) => {
          warn!("第 {} 行无法解析，已跳过: {}", self.line_number, e);
        }
      }
    }
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "landmark_file_input")]
  #[error("关键点文件输入错误: {0}")]
  LandmarkFileInputError(#[from] LandmarkFileInputError),
  #[error("标准输入错误: {0}")]
  LandmarkStdinInputError(#[from] LandmarkStdinInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "landmark_file_input")]
  LandmarkFile(LandmarkFileInput),
  Stdin(LandmarkStdinInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    #[cfg(feature = "landmark_file_input")]
    {
      if url.scheme() == LandmarkFileInput::SCHEME {
        let input = LandmarkFileInput::from_url(url)?;
        return Ok(InputWrapper::LandmarkFile(input));
      }
    }
    if url.scheme() == LandmarkStdinInput::SCHEME {
      let input = LandmarkStdinInput::from_url(url)?;
      return Ok(InputWrapper::Stdin(input));
    }
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  pub fn into_frames(self) -> InputWrapperIter {
    match self {
      #[cfg(feature = "landmark_file_input")]
      InputWrapper::LandmarkFile(input) => InputWrapperIter::LandmarkFile(input.into_frames()),
      InputWrapper::Stdin(input) => InputWrapperIter::Stdin(input.into_frames()),
    }
  }
}

pub enum InputWrapperIter {
  #[cfg(feature = "landmark_file_input")]
  LandmarkFile(self::landmark_file::LandmarkFileFrames),
  Stdin(self::landmark_stdin::LandmarkStdinFrames),
}

impl Iterator for InputWrapperIter {
  type Item = TimedDetections;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "landmark_file_input")]
      InputWrapperIter::LandmarkFile(input) => input.next(),
      InputWrapperIter::Stdin(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn holistic_hand_fields_are_labelled() {
    let frame = parse_frame_line(
      r#"{"timestamp_ms": 120, "left_hand": [{"x": 0.1, "y": 0.2}], "pose": [{"x": 0.5, "y": 0.5, "z": 0.0}]}"#,
      0,
    )
    .unwrap();
    assert_eq!(frame.timestamp_ms, 120);
    assert!(frame.detections.has_pose());
    let (left, right) = frame.detections.split_hands();
    assert_eq!(left.unwrap().len(), 1);
    assert!(right.is_none());
  }

  #[test]
  fn bad_lines_are_skipped_and_timestamps_filled() {
    let data = "\n{\"hands\": []}\nnot json\n{\"hands\": [{\"landmarks\": [{\"x\": 0.3, \"y\": 0.3}]}]}\n";
    let pacing = Pacing {
      frame_interval_ms: 40,
      realtime: false,
    };
    let frames: Vec<_> = LandmarkLines::new(Cursor::new(data), pacing).collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp_ms, 0);
    assert_eq!(frames[1].timestamp_ms, 40);
    assert!(frames[1].detections.has_hands());
  }

  #[test]
  fn pacing_reads_fps_and_realtime() {
    let query: HashMap<String, String> = [("fps", "25"), ("realtime", "")]
      .into_iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    let pacing = Pacing::from_query(&query).unwrap();
    assert_eq!(pacing.frame_interval_ms, 40);
    assert!(pacing.realtime);

    let query: HashMap<String, String> = [("fps".to_string(), "0".to_string())].into();
    assert!(Pacing::from_query(&query).is_err());
  }
}
