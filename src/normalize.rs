// 该文件是 Shouyu （手语） 项目的一部分。
// src/normalize.rs - 关键点归一化
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

use serde::{Deserialize, Serialize};

use crate::landmark::Landmark;

/// 归一化策略，必须与下游分类模型训练时的处理一致
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizePolicy {
  /// 原样输出图像归一化坐标
  #[default]
  Raw,
  /// 减去包围盒左上角 (min x, min y)，z 不变
  BboxOffset,
  /// 减去包围盒左上角后再除以包围盒宽高，z 不变
  BboxScaled,
}

/// 将一组关键点展平为长度恰为 `cardinality * 3` 的数组。
///
/// 输入缺失或点数不足时以 (0, 0, 0) 补齐，多余的点被截断。
/// 包围盒只在实际参与输出的点上计算。
pub fn normalize(
  landmarks: Option<&[Landmark]>,
  cardinality: usize,
  policy: NormalizePolicy,
) -> Vec<f32> {
  let mut out = vec![0.0f32; cardinality * 3];
  let points: Vec<Landmark> = landmarks
    .unwrap_or(&[])
    .iter()
    .take(cardinality)
    .map(|lm| lm.sanitized())
    .collect();

  if points.is_empty() {
    return out;
  }

  let (offset_x, offset_y, scale_x, scale_y) = match policy {
    NormalizePolicy::Raw => (0.0, 0.0, 1.0, 1.0),
    NormalizePolicy::BboxOffset => {
      let bbox = BoundingBox::of(&points);
      (bbox.min_x, bbox.min_y, 1.0, 1.0)
    }
    NormalizePolicy::BboxScaled => {
      let bbox = BoundingBox::of(&points);
      (bbox.min_x, bbox.min_y, bbox.extent_x(), bbox.extent_y())
    }
  };

  for (i, p) in points.iter().enumerate() {
    out[i * 3] = (p.x - offset_x) / scale_x;
    out[i * 3 + 1] = (p.y - offset_y) / scale_y;
    out[i * 3 + 2] = p.z;
  }
  out
}

/// 关键点在 x/y 平面上的包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub min_x: f32,
  pub min_y: f32,
  pub max_x: f32,
  pub max_y: f32,
}

impl BoundingBox {
  /// 空输入得到全零包围盒
  pub fn of(points: &[Landmark]) -> Self {
    if points.is_empty() {
      return Self {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 0.0,
      };
    }
    points.iter().fold(
      Self {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
      },
      |b, p| Self {
        min_x: b.min_x.min(p.x),
        min_y: b.min_y.min(p.y),
        max_x: b.max_x.max(p.x),
        max_y: b.max_y.max(p.y),
      },
    )
  }

  /// 宽度，退化时取 1
  pub fn extent_x(&self) -> f32 {
    let w = self.max_x - self.min_x;
    if w > 0.0 { w } else { 1.0 }
  }

  /// 高度，退化时取 1
  pub fn extent_y(&self) -> f32 {
    let h = self.max_y - self.min_y;
    if h > 0.0 { h } else { 1.0 }
  }
}
