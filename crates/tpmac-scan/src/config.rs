//! 扫描配置
//!
//! TOML 文件描述连接参数与扫描选项；连接对象由调用方显式构建并
//! 持有，不存在模块级全局连接。
//!
//! ```toml
//! host = "172.23.253.15"
//! port = 1025
//! timeout_ms = 3000
//! program = 1
//! coordinate_system = 1
//! poll_interval_ms = 250
//! ```

use crate::streamer::ScanOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tpmac_client::ControllerBuilder;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_port() -> u16 {
    1025
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_program() -> u16 {
    1
}

fn default_cs() -> u8 {
    1
}

/// 扫描会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 控制器主机名或 IP
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 响应超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 运动程序号
    #[serde(default = "default_program")]
    pub program: u16,

    /// 坐标系号
    #[serde(default = "default_cs")]
    pub coordinate_system: u8,

    /// 状态轮询间隔（毫秒）；缺省时由移动时间推导
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl ScanConfig {
    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// 响应超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 按配置生成连接构建器
    pub fn builder(&self) -> ControllerBuilder {
        ControllerBuilder::new(self.host.clone())
            .port(self.port)
            .timeout(self.timeout())
    }

    /// 按配置生成扫描选项
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            program: self.program,
            cs: self.coordinate_system,
            poll_interval: self.poll_interval_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: ScanConfig = toml::from_str(
            r#"
            host = "172.23.253.15"
            port = 1025
            timeout_ms = 5000
            program = 2
            coordinate_system = 3
            poll_interval_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "172.23.253.15");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.program, 2);
        assert_eq!(config.scan_options().cs, 3);
        assert_eq!(
            config.scan_options().poll_interval,
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config: ScanConfig = toml::from_str(r#"host = "localhost""#).unwrap();

        assert_eq!(config.port, 1025);
        assert_eq!(config.timeout_ms, 3000);
        assert_eq!(config.program, 1);
        assert_eq!(config.coordinate_system, 1);
        assert_eq!(config.poll_interval_ms, None);
    }

    #[test]
    fn test_missing_host_rejected() {
        assert!(toml::from_str::<ScanConfig>("port = 1025").is_err());
    }
}
