// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/landmark_stdin.rs - 标准输入的关键点流
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

use std::io::StdinLock;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{LandmarkLines, Pacing},
  url_query,
};

#[derive(Error, Debug)]
pub enum LandmarkStdinInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的参数 {key}={value}")]
  InvalidOption { key: String, value: String },
}

pub type LandmarkStdinFrames = LandmarkLines<StdinLock<'static>>;

/// 检测器通过管道逐行写入 `stdin://`
pub struct LandmarkStdinInput {
  pacing: Pacing,
}

impl FromUrlWithScheme for LandmarkStdinInput {
  const SCHEME: &'static str = "stdin";
}

impl FromUrl for LandmarkStdinInput {
  type Error = LandmarkStdinInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LandmarkStdinInputError::SchemeMismatch);
    }
    let pacing = Pacing::from_query(&url_query(url))
      .map_err(|(key, value)| LandmarkStdinInputError::InvalidOption { key, value })?;
    Ok(LandmarkStdinInput { pacing })
  }
}

impl LandmarkStdinInput {
  pub fn into_frames(self) -> LandmarkStdinFrames {
    LandmarkLines::new(std::io::stdin().lock(), self.pacing)
  }
}
