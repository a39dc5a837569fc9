// 该文件是 Shouyu （手语） 项目的一部分。
// src/profile.rs - 课程模块配置
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

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  feature::FeatureLayout,
  gate::{DiscreteGate, SendGate, SequenceGate},
  normalize::NormalizePolicy,
  stability::{DEFAULT_STABILITY_WINDOW, DEFAULT_VARIANCE_THRESHOLD, StabilityDetector},
  tracker::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_REQUIRED_STABILITY, PredictionTracker},
  url_file_path, url_query,
};

/// `preset://<名称>?参数=值`
const PRESET_SCHEME: &str = "preset";
/// `profile:///路径.json?参数=值`
const PROFILE_SCHEME: &str = "profile";

pub const PRESET_NAMES: [&str; 8] = [
  "alphabet",
  "numbers",
  "words",
  "two-hands",
  "general-words",
  "az-words",
  "sentence",
  "sentence-spelling",
];

#[derive(Error, Debug)]
pub enum ProfileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未知的预设模块: {0}")]
  UnknownPreset(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidOverride { key: String, value: String },
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 发送方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SendMode {
  /// 单帧静态手势
  Discrete {
    #[serde(default = "default_stability_window")]
    stability_window: usize,
    #[serde(default = "default_variance_threshold")]
    variance_threshold: f32,
    #[serde(default = "default_force_send_frames")]
    force_send_frames: u32,
    #[serde(default = "default_force_send_margin")]
    force_send_margin: f32,
  },
  /// 定长时序手势
  Sequence {
    length: usize,
    #[serde(default)]
    require_pose: bool,
    #[serde(default)]
    reset_on_absence: bool,
  },
}

fn default_stability_window() -> usize {
  DEFAULT_STABILITY_WINDOW
}

fn default_variance_threshold() -> f32 {
  DEFAULT_VARIANCE_THRESHOLD
}

fn default_force_send_frames() -> u32 {
  4
}

fn default_force_send_margin() -> f32 {
  0.05
}

fn default_required_stability() -> u32 {
  DEFAULT_REQUIRED_STABILITY
}

fn default_confidence_threshold() -> f32 {
  DEFAULT_CONFIDENCE_THRESHOLD
}

impl SendMode {
  pub fn discrete() -> Self {
    SendMode::Discrete {
      stability_window: default_stability_window(),
      variance_threshold: default_variance_threshold(),
      force_send_frames: default_force_send_frames(),
      force_send_margin: default_force_send_margin(),
    }
  }

  pub fn sequence(length: usize) -> Self {
    SendMode::Sequence {
      length,
      require_pose: false,
      reset_on_absence: false,
    }
  }
}

/// 一个课程模块的完整流水线参数。
///
/// 每个模块对应一个独立的后端分类器，参数必须与该分类器的训练输入一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProfile {
  pub name: String,
  pub layout: FeatureLayout,
  pub mode: SendMode,
  pub min_nonzero_ratio: f32,
  pub cooldown_ms: u64,
  /// 是否在请求中附带当前目标
  #[serde(default)]
  pub send_target: bool,
  #[serde(default = "default_required_stability")]
  pub required_stability: u32,
  #[serde(default = "default_confidence_threshold")]
  pub confidence_threshold: f32,
  /// 默认的后端地址
  #[serde(default)]
  pub endpoint: Option<String>,
}

impl ModuleProfile {
  pub fn preset(name: &str) -> Result<Self, ProfileError> {
    let discrete = |name: &str, normalize, send_target, required, port: u16| ModuleProfile {
      name: name.to_string(),
      layout: FeatureLayout::single_hand(normalize),
      mode: SendMode::discrete(),
      min_nonzero_ratio: 0.25,
      cooldown_ms: 350,
      send_target,
      required_stability: required,
      confidence_threshold: 0.60,
      endpoint: Some(format!("tcp://localhost:{}/{}", port, name)),
    };
    let holistic = |name: &str, length, min_ratio, port: u16| ModuleProfile {
      name: name.to_string(),
      layout: FeatureLayout::holistic(NormalizePolicy::Raw),
      mode: SendMode::sequence(length),
      min_nonzero_ratio: min_ratio,
      cooldown_ms: 1000,
      send_target: true,
      required_stability: 2,
      confidence_threshold: 0.60,
      endpoint: Some(format!("tcp://localhost:{}/{}", port, name)),
    };

    let profile = match name {
      "alphabet" => discrete(name, NormalizePolicy::BboxOffset, true, 1, 5001),
      "numbers" => discrete(name, NormalizePolicy::BboxScaled, false, 2, 5002),
      "words" => discrete(name, NormalizePolicy::BboxOffset, true, 2, 5003),
      "two-hands" => ModuleProfile {
        layout: FeatureLayout::two_hands(NormalizePolicy::BboxOffset),
        ..discrete(name, NormalizePolicy::BboxOffset, false, 2, 5008)
      },
      "general-words" => holistic(name, 30, 0.30, 5007),
      "az-words" => holistic(name, 30, 0.20, 5009),
      "sentence" => ModuleProfile {
        mode: SendMode::Sequence {
          length: 60,
          require_pose: true,
          reset_on_absence: true,
        },
        min_nonzero_ratio: 0.0,
        cooldown_ms: 0,
        send_target: false,
        required_stability: 1,
        confidence_threshold: 0.40,
        ..holistic(name, 60, 0.0, 5010)
      },
      // 句子课程中的拼写环节：有手即逐帧发送，与字母模块共用后端
      "sentence-spelling" => ModuleProfile {
        layout: FeatureLayout::two_hands(NormalizePolicy::BboxOffset),
        mode: SendMode::Discrete {
          stability_window: default_stability_window(),
          variance_threshold: default_variance_threshold(),
          force_send_frames: 1,
          force_send_margin: 0.0,
        },
        min_nonzero_ratio: 0.0,
        cooldown_ms: 0,
        confidence_threshold: 0.40,
        endpoint: Some("tcp://localhost:5001/alphabet".to_string()),
        ..discrete(name, NormalizePolicy::BboxOffset, true, 1, 5001)
      },
      other => return Err(ProfileError::UnknownPreset(other.to_string())),
    };
    Ok(profile)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
    let content = std::fs::read_to_string(path)?;
    let profile: ModuleProfile = serde_json::from_str(&content)?;
    Ok(profile)
  }

  pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ProfileError> {
    let content = serde_json::to_string_pretty(self)?;
    std::fs::write(path, content)?;
    Ok(())
  }

  pub fn validate(&self) -> Result<(), ProfileError> {
    if self.layout.parts.is_empty() {
      return Err(ProfileError::Invalid("特征布局不能为空".to_string()));
    }
    if !(0.0..1.0).contains(&self.min_nonzero_ratio) {
      return Err(ProfileError::Invalid(format!(
        "非零比例下限必须在 [0, 1) 内: {}",
        self.min_nonzero_ratio
      )));
    }
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ProfileError::Invalid(format!(
        "置信度阈值必须在 [0, 1] 内: {}",
        self.confidence_threshold
      )));
    }
    if self.required_stability == 0 {
      return Err(ProfileError::Invalid("稳定次数至少为 1".to_string()));
    }
    match &self.mode {
      SendMode::Discrete {
        stability_window,
        variance_threshold,
        force_send_frames,
        ..
      } => {
        if *stability_window < 2 {
          return Err(ProfileError::Invalid(format!(
            "稳定窗口至少为 2 帧: {}",
            stability_window
          )));
        }
        if *variance_threshold <= 0.0 {
          return Err(ProfileError::Invalid("抖动阈值必须为正数".to_string()));
        }
        if *force_send_frames == 0 {
          return Err(ProfileError::Invalid("强制发送帧数至少为 1".to_string()));
        }
      }
      SendMode::Sequence { length, .. } => {
        if *length == 0 {
          return Err(ProfileError::Invalid("序列长度至少为 1".to_string()));
        }
      }
    }
    if let Some(endpoint) = &self.endpoint
      && Url::parse(endpoint).is_err()
    {
      return Err(ProfileError::Invalid(format!("后端地址无效: {}", endpoint)));
    }
    Ok(())
  }

  /// 用 URL 查询参数覆盖配置项
  pub fn apply_overrides(&mut self, query: &HashMap<String, String>) -> Result<(), ProfileError> {
    fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ProfileError> {
      value.parse::<T>().map_err(|_| ProfileError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
      })
    }

    for (key, value) in query {
      match key.as_str() {
        "cooldown_ms" => self.cooldown_ms = parse(key, value)?,
        "min_nonzero_ratio" => self.min_nonzero_ratio = parse(key, value)?,
        "required_stability" => self.required_stability = parse(key, value)?,
        "confidence_threshold" => self.confidence_threshold = parse(key, value)?,
        "send_target" => self.send_target = parse(key, value)?,
        "endpoint" => self.endpoint = Some(value.clone()),
        "normalize" => {
          self.layout.normalize = match value.as_str() {
            "raw" => NormalizePolicy::Raw,
            "bbox-offset" => NormalizePolicy::BboxOffset,
            "bbox-scaled" => NormalizePolicy::BboxScaled,
            _ => {
              return Err(ProfileError::InvalidOverride {
                key: key.clone(),
                value: value.clone(),
              });
            }
          }
        }
        "sequence_length" => match &mut self.mode {
          SendMode::Sequence { length, .. } => *length = parse(key, value)?,
          SendMode::Discrete { .. } => {
            return Err(ProfileError::InvalidOverride {
              key: key.clone(),
              value: value.clone(),
            });
          }
        },
        "variance_threshold" => match &mut self.mode {
          SendMode::Discrete {
            variance_threshold,
            ..
          } => *variance_threshold = parse(key, value)?,
          SendMode::Sequence { .. } => {
            return Err(ProfileError::InvalidOverride {
              key: key.clone(),
              value: value.clone(),
            });
          }
        },
        other => debug!("忽略未知的配置参数: {}", other),
      }
    }
    Ok(())
  }

  pub fn build_gate(&self) -> SendGate {
    match &self.mode {
      SendMode::Discrete {
        stability_window,
        variance_threshold,
        force_send_frames,
        force_send_margin,
      } => SendGate::Discrete(DiscreteGate::new(
        StabilityDetector::new(*stability_window, *variance_threshold),
        self.min_nonzero_ratio,
        *force_send_frames,
        *force_send_margin,
        self.cooldown_ms,
      )),
      SendMode::Sequence {
        length,
        require_pose,
        reset_on_absence,
      } => SendGate::Sequence(SequenceGate::new(
        *length,
        self.min_nonzero_ratio,
        *require_pose,
        *reset_on_absence,
        self.cooldown_ms,
      )),
    }
  }

  pub fn build_tracker(&self) -> PredictionTracker {
    PredictionTracker::new(self.required_stability, self.confidence_threshold)
  }

  pub fn endpoint_url(&self) -> Option<Url> {
    self.endpoint.as_deref().and_then(|e| Url::parse(e).ok())
  }
}

impl FromUrl for ModuleProfile {
  type Error = ProfileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut profile = match url.scheme() {
      PRESET_SCHEME => {
        let name = url
          .host_str()
          .map(String::from)
          .unwrap_or_else(|| url.path().trim_start_matches('/').to_string());
        ModuleProfile::preset(&name)?
      }
      PROFILE_SCHEME => {
        let path = url_file_path(url);
        info!("加载模块配置文件: {}", path);
        ModuleProfile::from_file(&path)?
      }
      other => {
        error!("URI scheme mismatch: expected 'preset' or 'profile', found '{}'", other);
        return Err(ProfileError::SchemeMismatch(other.to_string()));
      }
    };
    profile.apply_overrides(&url_query(url))?;
    profile.validate()?;
    debug!("模块配置: {:?}", profile);
    Ok(profile)
  }
}
