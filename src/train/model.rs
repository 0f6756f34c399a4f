// src/train/model.rs

//! Image backbone plus a single-output regression head.

use candle_core::{Module, Result, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Func, Linear, VarBuilder};
use candle_transformers::models::resnet;

/// Maps `(n, 3, h, w)` images to `(n, out_dim())` embeddings.
pub trait Backbone: Send + Sync {
    fn out_dim(&self) -> usize;
    fn forward(&self, images: &Tensor) -> Result<Tensor>;
}

/// Which feature extractor sits under the regression head.
#[derive(Debug, Clone, PartialEq)]
pub enum BackboneKind {
    /// ImageNet ResNets; variable names match the published timm safetensors
    ResNet18,
    ResNet34,
    ResNet50,
    /// Small randomly initialised conv net
    Compact(ConvBackboneConfig),
}

impl BackboneKind {
    pub fn build(&self, vb: VarBuilder<'static>) -> Result<Box<dyn Backbone>> {
        Ok(match self {
            Self::ResNet18 => Box::new(ResNetBackbone {
                net: resnet::resnet18_no_final_layer(vb)?,
                out_dim: 512,
            }),
            Self::ResNet34 => Box::new(ResNetBackbone {
                net: resnet::resnet34_no_final_layer(vb)?,
                out_dim: 512,
            }),
            Self::ResNet50 => Box::new(ResNetBackbone {
                net: resnet::resnet50_no_final_layer(vb)?,
                out_dim: 2048,
            }),
            Self::Compact(config) => Box::new(ConvBackbone::new(config, vb)?),
        })
    }
}

/// ResNet without its `fc` classifier; ends in global average pooling.
pub struct ResNetBackbone {
    net: Func<'static>,
    out_dim: usize,
}

impl Backbone for ResNetBackbone {
    fn out_dim(&self) -> usize {
        self.out_dim
    }

    fn forward(&self, images: &Tensor) -> Result<Tensor> {
        self.net.forward(images)
    }
}

/// Conv backbone configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConvBackboneConfig {
    /// Output channels of each stride-2 stage
    pub channels: Vec<usize>,
}

impl Default for ConvBackboneConfig {
    fn default() -> Self {
        Self {
            channels: vec![16, 32, 64, 128],
        }
    }
}

/// Stride-2 3×3 convolutions with ReLU, then global average pooling.
pub struct ConvBackbone {
    stages: Vec<Conv2d>,
    out_dim: usize,
}

impl ConvBackbone {
    pub fn new(config: &ConvBackboneConfig, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let mut stages = Vec::with_capacity(config.channels.len());
        let mut in_c = 3;
        for (i, &out_c) in config.channels.iter().enumerate() {
            stages.push(conv2d(in_c, out_c, 3, cfg, vb.pp(format!("conv{}", i)))?);
            in_c = out_c;
        }
        Ok(Self {
            stages,
            out_dim: in_c,
        })
    }
}

impl Backbone for ConvBackbone {
    fn out_dim(&self) -> usize {
        self.out_dim
    }

    fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let mut x = images.clone();
        for conv in &self.stages {
            x = conv.forward(&x)?.relu()?;
        }
        // global average pool over (h, w)
        x.mean((2, 3))
    }
}

pub struct WealthRegressor {
    backbone: Box<dyn Backbone>,
    head: Linear,
}

impl WealthRegressor {
    /// The head lives under `head.` in `vb`.
    pub fn new(backbone: Box<dyn Backbone>, vb: VarBuilder) -> Result<Self> {
        let head = linear(backbone.out_dim(), 1, vb.pp("head"))?;
        Ok(Self { backbone, head })
    }

    /// `(n, 1)` predicted wealth index.
    pub fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let features = self.backbone.forward(images)?;
        self.head.forward(&features)
    }
}
