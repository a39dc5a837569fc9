// 该文件是 Shouyu （手语） 项目的一部分。
// src/bin/probe.rs - 单次请求探测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use url::Url;

use shouyu::{
  FromUrl,
  classifier::ClassifierWrapper,
  input::InputWrapper,
  output::OutputWrapper,
  pipeline::Pipeline,
  profile::ModuleProfile,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 处理输入直到产生第一次请求，发送并输出收到的预测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模块配置
  #[arg(long, value_name = "PROFILE", default_value = "preset://alphabet")]
  pub profile: Url,
  /// 关键点输入
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 分类器地址
  #[arg(long, value_name = "CLASSIFIER")]
  pub classifier: Option<Url>,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log://?verbose")]
  pub output: Url,
  /// 目标手势
  #[arg(long, value_name = "TARGET")]
  pub target: Option<String>,
  /// 等待预测的时间（毫秒）
  #[arg(long, value_name = "MILLISECONDS", default_value = "5000")]
  pub timeout_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模块配置: {}", args.profile);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let profile = ModuleProfile::from_url(&args.profile)?;
  let classifier_url = args
    .classifier
    .or_else(|| profile.endpoint_url())
    .ok_or_else(|| anyhow!("未指定分类器地址"))?;
  info!("分类器地址: {}", classifier_url);

  let input = InputWrapper::from_url(&args.input)?;
  let classifier = ClassifierWrapper::from_url(&classifier_url)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let mut pipeline = Pipeline::new(profile)?;
  pipeline.set_target(args.target.as_deref());

  let report = OneShotTask::new(pipeline)
    .with_timeout(Duration::from_millis(args.timeout_ms))
    .run_task(input.into_frames(), classifier, output)?;
  info!("第 {} 帧发送，收到 {} 次预测", report.frames, report.predictions);

  Ok(())
}
