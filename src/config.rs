//! 自检配置.
//!
//! 从 JSON 文件读取, 缺省字段取默认值:
//!
//! ```json
//! { "trials": 256, "seed": 7, "stop_on_failure": true }
//! ```

use std::path::Path;

use anyhow::{Context, Result, ensure};
use log::debug;
use serde::{Deserialize, Serialize};

use avc_codec::h264::SelfTestParams;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SelfTestConfig {
    #[serde(default = "default_trials")]
    pub trials: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_mb_dim")]
    pub mb_cols: usize,
    #[serde(default = "default_mb_dim")]
    pub mb_rows: usize,
    #[serde(default = "default_max_qp_drop")]
    pub max_qp_drop: u8,
    #[serde(default)]
    pub stop_on_failure: bool,
}

fn default_trials() -> u32 {
    1024
}

fn default_seed() -> u64 {
    23995
}

fn default_mb_dim() -> usize {
    3
}

fn default_max_qp_drop() -> u8 {
    25
}

impl Default for SelfTestConfig {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            seed: default_seed(),
            mb_cols: default_mb_dim(),
            mb_rows: default_mb_dim(),
            max_qp_drop: default_max_qp_drop(),
            stop_on_failure: false,
        }
    }
}

impl SelfTestConfig {
    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.validate()?;
        debug!("已加载自检配置 {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.mb_cols > 0 && self.mb_rows > 0,
            "宏块网格尺寸无效: {}x{}",
            self.mb_cols,
            self.mb_rows
        );
        ensure!(self.max_qp_drop <= 51, "max_qp_drop 超出范围: {}", self.max_qp_drop);
        Ok(())
    }
}

impl From<SelfTestConfig> for SelfTestParams {
    fn from(config: SelfTestConfig) -> Self {
        Self {
            trials: config.trials,
            seed: config.seed,
            mb_cols: config.mb_cols,
            mb_rows: config.mb_rows,
            max_qp_drop: config.max_qp_drop,
            stop_on_failure: config.stop_on_failure,
        }
    }
}
