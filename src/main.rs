// 该文件是 Shouyu （手语） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

use shouyu::{
  FromUrl,
  classifier::ClassifierWrapper,
  input::InputWrapper,
  output::OutputWrapper,
  pipeline::Pipeline,
  profile::ModuleProfile,
  task::{LessonTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模块配置: {}", args.profile);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("目标手势: {:?}", args.targets);

  let profile = ModuleProfile::from_url(&args.profile)?;
  let classifier_url = match args.classifier {
    Some(url) => url,
    None => profile
      .endpoint_url()
      .ok_or_else(|| anyhow!("模块 {} 没有默认分类器地址，请指定 --classifier", profile.name))?,
  };
  info!("分类器地址: {}", classifier_url);

  let input = InputWrapper::from_url(&args.input)?;
  let classifier = ClassifierWrapper::from_url(&classifier_url)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let pipeline = Pipeline::new(profile)?;

  let report = LessonTask::new(pipeline, args.targets)
    .with_frame_number(args.frame_number)
    .with_drain_timeout(Duration::from_millis(args.drain_ms))
    .run_task(input.into_frames(), classifier, output)?;

  info!(
    "处理 {} 帧, 完成手势 {:?}, 课程完成: {}",
    report.frames, report.completed, report.lesson_complete
  );

  Ok(())
}
