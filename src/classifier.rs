// 该文件是 Shouyu （手语） 项目的一部分。
// src/classifier.rs - 远端分类器
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

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  protocol::{PredictRequest, PredictionResponse},
};

/// 与分类后端之间的异步请求/响应通道
///
/// 发送与响应之间没有顺序关联；响应通过 [`Classifier::poll`] 取回，
/// 每个响应独立交给跟踪器处理。
pub trait Classifier {
  type Error;

  /// 发送一次请求。未连接时请求被丢弃，返回 [`Delivery::Dropped`]
  fn send(&mut self, request: &PredictRequest) -> Result<Delivery, Self::Error>;

  /// 取回目前已到达的全部事件，不阻塞
  fn poll(&mut self) -> Vec<ClassifierEvent>;

  /// 是否有连接尝试仍在后台进行
  fn is_connecting(&self) -> bool {
    false
  }

  fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
  Sent,
  Dropped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionEvent {
  Connected,
  Disconnected,
  ConnectError { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierEvent {
  Prediction(PredictionResponse),
  Connection(ConnectionEvent),
}

#[cfg(feature = "tcp_classifier")]
mod tcp_socket;
#[cfg(feature = "tcp_classifier")]
pub use self::tcp_socket::{Backoff, TcpClassifier, TcpClassifierError};

#[cfg(feature = "record_classifier")]
mod record;
#[cfg(feature = "record_classifier")]
pub use self::record::{RecordClassifier, RecordClassifierError};

mod scripted;
pub use self::scripted::{ScriptedClassifier, ScriptedClassifierError};

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[cfg(feature = "tcp_classifier")]
  #[error("TCP 分类器错误: {0}")]
  TcpClassifierError(#[from] TcpClassifierError),
  #[cfg(feature = "record_classifier")]
  #[error("记录分类器错误: {0}")]
  RecordClassifierError(#[from] RecordClassifierError),
  #[error("脚本分类器错误: {0}")]
  ScriptedClassifierError(#[from] ScriptedClassifierError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum ClassifierWrapper {
  #[cfg(feature = "tcp_classifier")]
  Tcp(TcpClassifier),
  #[cfg(feature = "record_classifier")]
  Record(RecordClassifier),
  Scripted(ScriptedClassifier),
}

impl FromUrl for ClassifierWrapper {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    #[cfg(feature = "tcp_classifier")]
    {
      if url.scheme() == TcpClassifier::SCHEME {
        return Ok(ClassifierWrapper::Tcp(TcpClassifier::from_url(url)?));
      }
    }
    #[cfg(feature = "record_classifier")]
    {
      if url.scheme() == RecordClassifier::SCHEME {
        return Ok(ClassifierWrapper::Record(RecordClassifier::from_url(url)?));
      }
    }
    if url.scheme() == ScriptedClassifier::SCHEME {
      return Ok(ClassifierWrapper::Scripted(ScriptedClassifier::from_url(
        url,
      )?));
    }
    Err(ClassifierError::SchemeMismatch)
  }
}

impl Classifier for ClassifierWrapper {
  type Error = ClassifierError;

  fn send(&mut self, request: &PredictRequest) -> Result<Delivery, Self::Error> {
    match self {
      #[cfg(feature = "tcp_classifier")]
      ClassifierWrapper::Tcp(classifier) => classifier.send(request).map_err(ClassifierError::from),
      #[cfg(feature = "record_classifier")]
      ClassifierWrapper::Record(classifier) => {
        classifier.send(request).map_err(ClassifierError::from)
      }
      ClassifierWrapper::Scripted(classifier) => {
        classifier.send(request).map_err(ClassifierError::from)
      }
    }
  }

  fn poll(&mut self) -> Vec<ClassifierEvent> {
    match self {
      #[cfg(feature = "tcp_classifier")]
      ClassifierWrapper::Tcp(classifier) => classifier.poll(),
      #[cfg(feature = "record_classifier")]
      ClassifierWrapper::Record(classifier) => classifier.poll(),
      ClassifierWrapper::Scripted(classifier) => classifier.poll(),
    }
  }

  fn is_connecting(&self) -> bool {
    match self {
      #[cfg(feature = "tcp_classifier")]
      ClassifierWrapper::Tcp(classifier) => classifier.is_connecting(),
      #[cfg(feature = "record_classifier")]
      ClassifierWrapper::Record(classifier) => classifier.is_connecting(),
      ClassifierWrapper::Scripted(classifier) => classifier.is_connecting(),
    }
  }

  fn close(&mut self) {
    match self {
      #[cfg(feature = "tcp_classifier")]
      ClassifierWrapper::Tcp(classifier) => classifier.close(),
      #[cfg(feature = "record_classifier")]
      ClassifierWrapper::Record(classifier) => classifier.close(),
      ClassifierWrapper::Scripted(classifier) => classifier.close(),
    }
  }
}
