// 该文件是 Shouyu （手语） 项目的一部分。
// src/task.rs - 课程任务
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
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  classifier::{Classifier, ClassifierEvent, Delivery},
  landmark::TimedDetections,
  output::{Render, SessionEvent},
  pipeline::Pipeline,
  protocol::PredictRequest,
  tracker::TrackerEvent,
};

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_secs(5);

/// 开始处理输入前，在限定时间内等待首次连接结果
fn wait_for_connection<C: Classifier>(
  classifier: &mut C,
  timeout: Duration,
  mut dispatch: impl FnMut(Vec<ClassifierEvent>) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
  let deadline = Instant::now() + timeout;
  while classifier.is_connecting() && Instant::now() < deadline {
    dispatch(classifier.poll())?;
    thread::sleep(POLL_INTERVAL);
  }
  if classifier.is_connecting() {
    warn!("等待分类器连接超时 ({:.2?})，先行处理输入", timeout);
  }
  Ok(())
}

pub trait Task<I, C, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, classifier: C, output: O) -> Result<Self::Output, Self::Error>;
}

/// 一次任务运行的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReport {
  pub frames: usize,
  pub sent: usize,
  pub dropped: usize,
  pub predictions: usize,
  pub completed: Vec<String>,
  pub lesson_complete: bool,
}

/// Ctrl-C 只通知任务循环退出，30 秒内未退出则强制结束进程
fn install_interrupt() -> Receiver<()> {
  let (tx, rx) = channel();
  let handler = ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  });
  if let Err(e) = handler {
    warn!("无法注册中断处理: {}", e);
  }
  rx
}

/// 按目标列表依次练习手势的连续任务
pub struct LessonTask {
  pipeline: Pipeline,
  targets: Vec<String>,
  current: usize,
  frame_number: Option<usize>,
  drain_timeout: Duration,
  connect_wait: Duration,
  report: TaskReport,
}

impl LessonTask {
  pub fn new(pipeline: Pipeline, targets: Vec<String>) -> Self {
    Self {
      pipeline,
      targets,
      current: 0,
      frame_number: None,
      drain_timeout: DEFAULT_DRAIN_TIMEOUT,
      connect_wait: DEFAULT_CONNECT_WAIT,
      report: TaskReport::default(),
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
    self.drain_timeout = drain_timeout;
    self
  }

  pub fn with_connect_wait(mut self, connect_wait: Duration) -> Self {
    self.connect_wait = connect_wait;
    self
  }

  fn awaiting(&self) -> bool {
    !self.report.lesson_complete && self.report.predictions < self.report.sent
  }

  fn advance<O: Render>(&mut self, completed: String, output: &O) -> Result<(), O::Error> {
    self.report.completed.push(completed.clone());
    self.current += 1;
    let next = self.targets.get(self.current).cloned();
    self.pipeline.set_target(next.as_deref());
    output.render_event(&SessionEvent::Advanced { completed, next })?;
    if self.current >= self.targets.len() {
      self.report.lesson_complete = true;
      output.render_event(&SessionEvent::LessonComplete {
        targets: self.targets.len(),
      })?;
    }
    Ok(())
  }

  fn dispatch<O: Render>(&mut self, events: Vec<ClassifierEvent>, output: &O) -> Result<(), O::Error> {
    for event in events {
      match event {
        ClassifierEvent::Connection(connection) => {
          output.render_event(&SessionEvent::Connection(connection))?;
        }
        ClassifierEvent::Prediction(response) => {
          self.report.predictions += 1;
          output.render_event(&SessionEvent::Prediction(response.clone()))?;
          let target = self.pipeline.target().map(String::from);
          let outcome = self.pipeline.on_prediction(&response);
          output.render_event(&SessionEvent::Tracker {
            target,
            outcome: outcome.clone(),
          })?;
          if let TrackerEvent::Completed { target } = outcome {
            self.advance(target, output)?;
          }
        }
      }
    }
    Ok(())
  }

  fn submit<C: Classifier, O: Render>(
    &mut self,
    request: PredictRequest,
    classifier: &mut C,
    output: &O,
  ) -> Result<(), anyhow::Error>
  where
    C::Error: std::error::Error + Send + Sync + 'static,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let delivery = classifier.send(&request)?;
    match delivery {
      Delivery::Sent => self.report.sent += 1,
      Delivery::Dropped => self.report.dropped += 1,
    }
    output.render_event(&SessionEvent::Sent {
      kind: request.kind(),
      frames: request.frame_count(),
      target: request.target().map(String::from),
      delivery,
    })?;
    Ok(())
  }
}

impl<
  CE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = TimedDetections>,
  C: Classifier<Error = CE>,
  O: Render<Error = RE>,
> Task<I, C, O> for LessonTask
{
  type Output = TaskReport;
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, mut classifier: C, output: O) -> Result<TaskReport, Self::Error> {
    self.targets.retain(|t| !t.trim().is_empty());
    if self.targets.is_empty() {
      anyhow::bail!("课程任务至少需要一个目标手势");
    }
    info!("开始课程任务，目标: {:?}", self.targets);
    let stop = install_interrupt();
    let first = self.targets.first().cloned();
    self.pipeline.set_target(first.as_deref());
    self.pipeline.restart();

    let connect_wait = self.connect_wait;
    wait_for_connection(&mut classifier, connect_wait, |events| {
      self.dispatch(events, &output).map_err(anyhow::Error::from)
    })?;

    let now = Instant::now();
    for frame in input {
      self.dispatch(classifier.poll(), &output)?;
      if self.report.lesson_complete {
        break;
      }

      self.report.frames += 1;
      let outcome = self.pipeline.on_frame(&frame);
      output.render_event(&SessionEvent::Frame(outcome.status))?;
      if let Some(request) = outcome.request {
        self.submit(request, &mut classifier, &output)?;
      }

      if self.frame_number.is_some_and(|n| self.report.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", self.report.frames);
        break;
      }
      if stop.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    // 输入结束后在限定时间内等待尚未返回的预测
    let deadline = Instant::now() + self.drain_timeout;
    while self.awaiting() && Instant::now() < deadline {
      self.dispatch(classifier.poll(), &output)?;
      if stop.try_recv().is_ok() {
        break;
      }
      thread::sleep(POLL_INTERVAL);
    }
    if self.awaiting() {
      debug!(
        "仍有 {} 个请求未收到预测",
        self.report.sent - self.report.predictions
      );
    }

    classifier.close();
    self.dispatch(classifier.poll(), &output)?;
    self.pipeline.stop();

    info!(
      "任务完成: {} 帧, 发送 {}, 丢弃 {}, 预测 {}, 完成 {:?}, 耗时 {:.2?}",
      self.report.frames,
      self.report.sent,
      self.report.dropped,
      self.report.predictions,
      self.report.completed,
      now.elapsed()
    );
    Ok(self.report)
  }
}

/// 只处理到第一次请求：发送后等待一次预测并输出
pub struct OneShotTask {
  pipeline: Pipeline,
  timeout: Duration,
}

impl OneShotTask {
  pub fn new(pipeline: Pipeline) -> Self {
    Self {
      pipeline,
      timeout: DEFAULT_DRAIN_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl<
  CE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = TimedDetections>,
  C: Classifier<Error = CE>,
  O: Render<Error = RE>,
> Task<I, C, O> for OneShotTask
{
  type Output = TaskReport;
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, mut classifier: C, output: O) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let mut report = TaskReport::default();
    let mut request = None;
    for frame in input {
      report.frames += 1;
      let outcome = self.pipeline.on_frame(&frame);
      output.render_event(&SessionEvent::Frame(outcome.status))?;
      if outcome.request.is_some() {
        request = outcome.request;
        break;
      }
    }
    let request = request.ok_or_else(|| anyhow::anyhow!("输入结束仍未产生请求"))?;
    info!(
      "第 {} 帧产生 {} 请求 ({} 帧)，开始发送...",
      report.frames,
      request.kind(),
      request.frame_count()
    );

    wait_for_connection(&mut classifier, self.timeout, |events| {
      for event in events {
        if let ClassifierEvent::Connection(connection) = event {
          output.render_event(&SessionEvent::Connection(connection))?;
        }
      }
      Ok(())
    })?;

    let now = Instant::now();
    let delivery = classifier.send(&request)?;
    output.render_event(&SessionEvent::Sent {
      kind: request.kind(),
      frames: request.frame_count(),
      target: request.target().map(String::from),
      delivery,
    })?;
    if delivery == Delivery::Dropped {
      report.dropped += 1;
      return Err(anyhow::anyhow!("分类器未连接，请求被丢弃"));
    }
    report.sent += 1;

    while now.elapsed() < self.timeout {
      for event in classifier.poll() {
        match event {
          ClassifierEvent::Prediction(response) => {
            info!("收到预测，耗时: {:.2?}", now.elapsed());
            report.predictions += 1;
            output.render_event(&SessionEvent::Prediction(response))?;
          }
          ClassifierEvent::Connection(connection) => {
            output.render_event(&SessionEvent::Connection(connection))?;
          }
        }
      }
      if report.predictions > 0 {
        break;
      }
      thread::sleep(POLL_INTERVAL);
    }
    classifier.close();

    if report.predictions == 0 {
      return Err(anyhow::anyhow!("等待预测超时 ({:.2?})", self.timeout));
    }
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    classifier::ScriptedClassifier,
    landmark::{DetectedHand, Detections, Landmark},
    output::LogOutput,
    profile::ModuleProfile,
    protocol::PredictionResponse,
    FromUrl,
  };

  fn frames(count: u64) -> Vec<TimedDetections> {
    (0..count)
      .map(|t| TimedDetections {
        timestamp_ms: t * 100,
        detections: Detections {
          hands: vec![DetectedHand {
            handedness: Some("Right".into()),
            landmarks: (0..21)
              .map(|i| Landmark::new(0.3 + i as f32 * 0.01, 0.4, -0.02))
              .collect(),
          }],
          ..Default::default()
        },
      })
      .collect()
  }

  fn log_output() -> LogOutput {
    LogOutput::from_url(&url::Url::parse("log://").unwrap()).unwrap()
  }

  #[test]
  fn lesson_advances_through_targets() {
    let pipeline = Pipeline::new(ModuleProfile::preset("words").unwrap()).unwrap();
    let classifier = ScriptedClassifier::new(
      vec![
        PredictionResponse::ok("Hello", 0.8, true),
        PredictionResponse::ok("Hello", 0.8, true),
        PredictionResponse::ok("Thanks", 0.9, true),
        PredictionResponse::ok("Thanks", 0.9, true),
      ],
      false,
    );
    let report = LessonTask::new(pipeline, vec!["Hello".into(), "Thanks".into()])
      .with_drain_timeout(Duration::from_millis(50))
      .run_task(frames(40).into_iter(), classifier, log_output())
      .unwrap();
    assert_eq!(report.completed, vec!["Hello".to_string(), "Thanks".to_string()]);
    assert!(report.lesson_complete);
    assert_eq!(report.sent, 4);
  }

  #[test]
  fn lesson_without_targets_is_rejected() {
    let pipeline = Pipeline::new(ModuleProfile::preset("words").unwrap()).unwrap();
    let classifier = ScriptedClassifier::new(Vec::new(), false);
    let result = LessonTask::new(pipeline, vec!["".into(), " ".into()]).run_task(
      frames(10).into_iter(),
      classifier,
      log_output(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn frame_number_bounds_the_run() {
    let pipeline = Pipeline::new(ModuleProfile::preset("alphabet").unwrap()).unwrap();
    let classifier = ScriptedClassifier::new(Vec::new(), false);
    let report = LessonTask::new(pipeline, vec!["A".into()])
      .with_frame_number(Some(5))
      .with_drain_timeout(Duration::from_millis(10))
      .run_task(frames(100).into_iter(), classifier, log_output())
      .unwrap();
    assert_eq!(report.frames, 5);
    assert!(!report.lesson_complete);
  }

  #[test]
  fn one_shot_fails_without_request() {
    let pipeline = Pipeline::new(ModuleProfile::preset("alphabet").unwrap()).unwrap();
    let classifier = ScriptedClassifier::new(Vec::new(), false);
    let result = OneShotTask::new(pipeline).run_task(
      vec![TimedDetections::default(); 5].into_iter(),
      classifier,
      log_output(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn one_shot_renders_first_prediction() {
    let pipeline = Pipeline::new(ModuleProfile::preset("alphabet").unwrap()).unwrap();
    let classifier =
      ScriptedClassifier::new(vec![PredictionResponse::ok("A", 0.9, true)], false);
    let report = OneShotTask::new(pipeline)
      .run_task(frames(10).into_iter(), classifier, log_output())
      .unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.predictions, 1);
    assert_eq!(report.frames, 3);
  }
}
