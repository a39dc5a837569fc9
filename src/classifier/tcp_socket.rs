// 该文件是 Shouyu （手语） 项目的一部分。
// src/classifier/tcp_socket.rs - 基于 TCP 行协议的分类器客户端
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
  io::{BufRead, BufReader, Write},
  net::{Shutdown, TcpStream, ToSocketAddrs},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, Sender, channel},
  },
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classifier::{Classifier, ClassifierEvent, ConnectionEvent, Delivery},
  protocol::{Envelope, PredictRequest, ProtocolError, ServerEvent},
  url_query,
};

#[derive(Error, Debug)]
pub enum TcpClassifierError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少主机或端口: {0}")]
  MissingAddress(String),
  #[error("无效的参数 {key}={value}")]
  InvalidOption { key: String, value: String },
  #[error("协议错误: {0}")]
  ProtocolError(#[from] ProtocolError),
}

/// 重连退避：每次失败后等待时间翻倍，直到上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
  pub initial_ms: u64,
  pub max_ms: u64,
  pub attempts: u32,
}

impl Default for Backoff {
  fn default() -> Self {
    Self {
      initial_ms: 1000,
      max_ms: 5000,
      attempts: 5,
    }
  }
}

impl Backoff {
  /// 第 `failure` 次失败（从 1 开始）之后的等待时间
  pub fn delay(&self, failure: u32) -> Duration {
    let shift = failure.saturating_sub(1).min(16);
    let ms = self.initial_ms.saturating_mul(1u64 << shift).min(self.max_ms);
    Duration::from_millis(ms)
  }
}

/// 连接线程发回的消息，带连接代数以识别过期的通知
enum Inbound {
  Connected { generation: u64, writer: TcpStream },
  ConnectFailed { generation: u64, message: String },
  Event { generation: u64, event: ClassifierEvent },
}

/// `tcp://host:port/namespace?reconnect_delay_ms=1000&reconnect_delay_max_ms=5000&reconnect_attempts=5`
///
/// 建立连接与读取响应都在后台线程中完成，`send` 与 `poll` 不会阻塞调用方。
pub struct TcpClassifier {
  address: String,
  namespace: Option<String>,
  backoff: Backoff,
  connect_timeout: Duration,
  writer: Option<TcpStream>,
  generation: u64,
  connecting: bool,
  failures: u32,
  next_attempt: Option<Instant>,
  closed: Arc<AtomicBool>,
  pending: Vec<ClassifierEvent>,
  tx: Sender<Inbound>,
  rx: Receiver<Inbound>,
}

impl FromUrlWithScheme for TcpClassifier {
  const SCHEME: &'static str = "tcp";
}

fn parse_option<T: std::str::FromStr>(
  query: &std::collections::HashMap<String, String>,
  key: &str,
  default: T,
) -> Result<T, TcpClassifierError> {
  match query.get(key) {
    None => Ok(default),
    Some(value) => value
      .parse()
      .map_err(|_| TcpClassifierError::InvalidOption {
        key: key.to_string(),
        value: value.clone(),
      }),
  }
}

impl FromUrl for TcpClassifier {
  type Error = TcpClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TcpClassifierError::SchemeMismatch);
    }

    let (Some(host), Some(port)) = (url.host_str(), url.port()) else {
      return Err(TcpClassifierError::MissingAddress(url.to_string()));
    };
    let namespace = match url.path().trim_end_matches('/') {
      "" => None,
      path => Some(path.to_string()),
    };

    let query = url_query(url);
    let defaults = Backoff::default();
    let backoff = Backoff {
      initial_ms: parse_option(&query, "reconnect_delay_ms", defaults.initial_ms)?,
      max_ms: parse_option(&query, "reconnect_delay_max_ms", defaults.max_ms)?,
      attempts: parse_option(&query, "reconnect_attempts", defaults.attempts)?,
    };
    let connect_timeout = Duration::from_millis(parse_option(&query, "connect_timeout_ms", 2000u64)?);

    let (tx, rx) = channel();
    let mut classifier = TcpClassifier {
      address: format!("{}:{}", host, port),
      namespace,
      backoff,
      connect_timeout,
      writer: None,
      generation: 0,
      connecting: false,
      failures: 0,
      next_attempt: None,
      closed: Arc::new(AtomicBool::new(false)),
      pending: Vec::new(),
      tx,
      rx,
    };
    info!(
      "分类器地址: {}, 命名空间: {:?}, 重连: {:?}",
      classifier.address, classifier.namespace, classifier.backoff
    );
    // 首次连接在后台进行，失败后按退避策略重试
    classifier.maybe_reconnect();
    Ok(classifier)
  }
}

impl TcpClassifier {
  pub fn is_connected(&self) -> bool {
    self.writer.is_some()
  }

  pub fn namespace(&self) -> Option<&str> {
    self.namespace.as_deref()
  }

  fn maybe_reconnect(&mut self) {
    if self.closed.load(Ordering::Relaxed)
      || self.writer.is_some()
      || self.connecting
      || self.failures > self.backoff.attempts
    {
      return;
    }
    if self.next_attempt.is_some_and(|at| Instant::now() < at) {
      return;
    }
    self.generation += 1;
    self.connecting = true;
    debug!("连接分类器 {} (第 {} 代)", self.address, self.generation);
    spawn_connection(Connection {
      address: self.address.clone(),
      timeout: self.connect_timeout,
      generation: self.generation,
      namespace: self.namespace.clone(),
      closed: Arc::clone(&self.closed),
      tx: self.tx.clone(),
    });
  }

  /// 处理后台线程发回的消息，过期代数的连接与断线通知被丢弃
  fn accept(&mut self, inbound: Inbound) -> Option<ClassifierEvent> {
    match inbound {
      Inbound::Connected { generation, writer } => {
        if generation != self.generation || self.closed.load(Ordering::Relaxed) {
          let _ = writer.shutdown(Shutdown::Both);
          return None;
        }
        self.connecting = false;
        self.failures = 0;
        self.next_attempt = None;
        self.writer = Some(writer);
        info!("已连接分类器 {}", self.address);
        Some(ClassifierEvent::Connection(ConnectionEvent::Connected))
      }
      Inbound::ConnectFailed {
        generation,
        message,
      } => {
        if generation != self.generation {
          return None;
        }
        self.connecting = false;
        self.failures += 1;
        warn!(
          "连接分类器 {} 失败 ({}/{}): {}",
          self.address,
          self.failures,
          self.backoff.attempts + 1,
          message
        );
        if self.failures > self.backoff.attempts {
          error!("分类器 {} 重连次数耗尽，后续请求将被丢弃", self.address);
        }
        self.next_attempt = Some(Instant::now() + self.backoff.delay(self.failures));
        Some(ClassifierEvent::Connection(ConnectionEvent::ConnectError {
          message,
        }))
      }
      Inbound::Event { generation, event } => {
        if event == ClassifierEvent::Connection(ConnectionEvent::Disconnected) {
          if generation != self.generation || self.writer.is_none() {
            return None;
          }
          warn!("分类器 {} 断开连接", self.address);
          self.writer = None;
          self.next_attempt = Some(Instant::now() + self.backoff.delay(1));
        }
        Some(event)
      }
    }
  }

  /// 非阻塞地收取后台消息，并在需要时发起重连
  fn pump(&mut self) {
    while let Ok(inbound) = self.rx.try_recv() {
      if let Some(event) = self.accept(inbound) {
        self.pending.push(event);
      }
    }
    self.maybe_reconnect();
  }

  fn drop_connection(&mut self) {
    if let Some(stream) = self.writer.take() {
      let _ = stream.shutdown(Shutdown::Both);
      // 使旧读线程的断线通知过期
      self.generation += 1;
      self.next_attempt = Some(Instant::now() + self.backoff.delay(1));
      self
        .pending
        .push(ClassifierEvent::Connection(ConnectionEvent::Disconnected));
    }
  }
}

/// 一次连接尝试所需的全部状态，移交给后台线程
struct Connection {
  address: String,
  timeout: Duration,
  generation: u64,
  namespace: Option<String>,
  closed: Arc<AtomicBool>,
  tx: Sender<Inbound>,
}

fn open_stream(address: &str, timeout: Duration) -> std::io::Result<TcpStream> {
  let mut last_error = None;
  for addr in address.to_socket_addrs()? {
    match TcpStream::connect_timeout(&addr, timeout) {
      Ok(stream) => {
        stream.set_nodelay(true)?;
        return Ok(stream);
      }
      Err(e) => last_error = Some(e),
    }
  }
  Err(last_error.unwrap_or_else(|| {
    std::io::Error::new(std::io::ErrorKind::NotFound, "地址解析结果为空")
  }))
}

/// 连接成功后，同一线程继续读取该连接上的响应
fn spawn_connection(connection: Connection) {
  thread::spawn(move || {
    let Connection {
      address,
      timeout,
      generation,
      namespace,
      closed,
      tx,
    } = connection;

    let (reader, writer) = match open_stream(&address, timeout)
      .and_then(|stream| Ok((stream.try_clone()?, stream)))
    {
      Ok(pair) => pair,
      Err(e) => {
        let _ = tx.send(Inbound::ConnectFailed {
          generation,
          message: e.to_string(),
        });
        return;
      }
    };
    if closed.load(Ordering::Relaxed) {
      let _ = reader.shutdown(Shutdown::Both);
      return;
    }
    if tx.send(Inbound::Connected { generation, writer }).is_err() {
      let _ = reader.shutdown(Shutdown::Both);
      return;
    }

    read_responses(reader, generation, namespace.as_deref(), &tx);
    let _ = tx.send(Inbound::Event {
      generation,
      event: ClassifierEvent::Connection(ConnectionEvent::Disconnected),
    });
  });
}

fn read_responses(stream: TcpStream, generation: u64, namespace: Option<&str>, tx: &Sender<Inbound>) {
  let mut reader = BufReader::new(stream);
  let mut buffer = Vec::new();
  loop {
    buffer.clear();
    match reader.read_until(b'\n', &mut buffer) {
      Ok(0) => return,
      Ok(_) => {}
      Err(e) => {
        debug!("读取分类器响应结束: {}", e);
        return;
      }
    }
    // 非 UTF-8 的行按无法解析处理，不影响连接
    let line = String::from_utf8_lossy(&buffer);
    if line.trim().is_empty() {
      continue;
    }
    let envelope = match Envelope::from_line(&line) {
      Ok(envelope) => envelope,
      Err(e) => {
        warn!("无法解析的服务端消息，已忽略: {}", e);
        continue;
      }
    };
    if let (Some(ours), Some(theirs)) = (namespace, envelope.namespace.as_deref())
      && ours != theirs
    {
      debug!("忽略其他命名空间 {} 的消息", theirs);
      continue;
    }
    match ServerEvent::from_envelope(envelope) {
      ServerEvent::Prediction(response) => {
        let inbound = Inbound::Event {
          generation,
          event: ClassifierEvent::Prediction(response),
        };
        if tx.send(inbound).is_err() {
          return;
        }
      }
      ServerEvent::Other { event, data } => {
        debug!("忽略服务端事件 {}: {}", event, data);
      }
    }
  }
}

impl Classifier for TcpClassifier {
  type Error = TcpClassifierError;

  fn send(&mut self, request: &PredictRequest) -> Result<Delivery, Self::Error> {
    self.pump();
    let line = Envelope::predict(self.namespace.as_deref(), request)?.to_line()?;

    let Some(stream) = self.writer.as_mut() else {
      debug!("分类器未连接，丢弃 {} 请求", request.kind());
      return Ok(Delivery::Dropped);
    };
    if let Err(e) = writeln!(stream, "{}", line).and_then(|_| stream.flush()) {
      warn!("发送请求失败，连接已断开: {}", e);
      self.drop_connection();
      return Ok(Delivery::Dropped);
    }
    debug!(
      "已发送 {} 请求 ({} 帧)",
      request.kind(),
      request.frame_count()
    );
    Ok(Delivery::Sent)
  }

  fn poll(&mut self) -> Vec<ClassifierEvent> {
    self.pump();
    std::mem::take(&mut self.pending)
  }

  fn is_connecting(&self) -> bool {
    self.connecting
  }

  fn close(&mut self) {
    self.closed.store(true, Ordering::Relaxed);
    self.generation += 1;
    if let Some(stream) = self.writer.take() {
      info!("关闭分类器连接 {}", self.address);
      let _ = stream.shutdown(Shutdown::Both);
    }
    // 关闭前刚建立的连接也一并断开
    while let Ok(inbound) = self.rx.try_recv() {
      if let Inbound::Connected { writer, .. } = inbound {
        let _ = writer.shutdown(Shutdown::Both);
      }
    }
  }
}

impl Drop for TcpClassifier {
  fn drop(&mut self) {
    self.close();
  }
}
