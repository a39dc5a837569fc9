// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/landmark_file.rs - 录制的关键点文件输入
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

use std::{fs::File, io::BufReader};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{LandmarkLines, Pacing},
  url_file_path, url_query,
};

#[derive(Error, Debug)]
pub enum LandmarkFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的参数 {key}={value}")]
  InvalidOption { key: String, value: String },
}

pub type LandmarkFileFrames = LandmarkLines<BufReader<File>>;

/// `jsonl:///path/to/frames.jsonl?fps=30&realtime`
pub struct LandmarkFileInput {
  reader: BufReader<File>,
  pacing: Pacing,
}

impl FromUrlWithScheme for LandmarkFileInput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for LandmarkFileInput {
  type Error = LandmarkFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LandmarkFileInputError::SchemeMismatch);
    }

    let pacing = Pacing::from_query(&url_query(url))
      .map_err(|(key, value)| LandmarkFileInputError::InvalidOption { key, value })?;
    let path = url_file_path(url);
    let file = File::open(&path)?;
    info!("打开关键点文件: {}", path);

    Ok(LandmarkFileInput {
      reader: BufReader::new(file),
      pacing,
    })
  }
}

impl LandmarkFileInput {
  pub fn into_frames(self) -> LandmarkFileFrames {
    LandmarkLines::new(self.reader, self.pacing)
  }
}
