// 该文件是 Shouyu （手语） 项目的一部分。
// src/classifier/record.rs - 离线记录请求
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
  fs::File,
  io::{BufWriter, Write},
};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classifier::{Classifier, ClassifierEvent, Delivery},
  protocol::{Envelope, PredictRequest, ProtocolError},
  url_file_path, url_query,
};

#[derive(Error, Debug)]
pub enum RecordClassifierError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("协议错误: {0}")]
  ProtocolError(#[from] ProtocolError),
}

/// 把每次请求按线上格式写入文件，不产生任何预测
///
/// `record:///path/to/requests.jsonl?namespace=/numbers`
pub struct RecordClassifier {
  writer: BufWriter<File>,
  namespace: Option<String>,
  count: usize,
}

impl FromUrlWithScheme for RecordClassifier {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordClassifier {
  type Error = RecordClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RecordClassifierError::SchemeMismatch);
    }
    let path = url_file_path(url);
    let namespace = url_query(url).remove("namespace");
    let file = File::create(&path)?;
    info!("请求记录到文件: {}", path);
    Ok(RecordClassifier {
      writer: BufWriter::new(file),
      namespace,
      count: 0,
    })
  }
}

impl RecordClassifier {
  pub fn recorded(&self) -> usize {
    self.count
  }
}

impl Classifier for RecordClassifier {
  type Error = RecordClassifierError;

  fn send(&mut self, request: &PredictRequest) -> Result<Delivery, Self::Error> {
    let line = Envelope::predict(self.namespace.as_deref(), request)?.to_line()?;
    writeln!(self.writer, "{}", line)?;
    self.count += 1;
    Ok(Delivery::Sent)
  }

  fn poll(&mut self) -> Vec<ClassifierEvent> {
    Vec::new()
  }

  fn close(&mut self) {
    if let Err(e) = self.writer.flush() {
      warn!("写入请求记录失败: {}", e);
    }
    info!("共记录 {} 次请求", self.count);
  }
}
