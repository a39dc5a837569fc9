// 该文件是 Shouyu （手语） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use clap::Parser;
use url::Url;

/// Shouyu 手语练习流水线
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模块配置
  /// 支持格式:
  /// - 预设: preset://alphabet, preset://az-words?cooldown_ms=800
  /// - 文件: profile:///path/to/profile.json
  #[arg(long, value_name = "PROFILE", default_value = "preset://alphabet")]
  pub profile: Url,

  /// 关键点输入
  /// 支持格式:
  /// - 文件: jsonl:///path/to/frames.jsonl?fps=30&realtime
  /// - 标准输入: stdin://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 分类器地址，缺省时使用模块配置中的地址
  /// 支持格式:
  /// - tcp://localhost:5001/alphabet
  /// - record:///path/to/requests.jsonl
  /// - script:///path/to/responses.jsonl
  #[arg(long, value_name = "CLASSIFIER")]
  pub classifier: Option<Url>,

  /// 事件输出
  /// 支持格式:
  /// - log://?verbose
  /// - jsonl:///path/to/session.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 依次练习的目标手势，逗号分隔
  #[arg(long, value_name = "TARGETS", value_delimiter = ',', required = true)]
  pub targets: Vec<String>,

  /// 最大处理帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 输入结束后等待预测的时间（毫秒）
  #[arg(long, value_name = "MILLISECONDS", default_value = "2000")]
  pub drain_ms: u64,
}
