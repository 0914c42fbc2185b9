//! 配置管理命令
//!
//! 配置文件为 TOML：`[default]` 段保存控制器地址与密钥，其余各段对应
//! 各组件的配置结构，缺省字段使用内置默认值。
//!
//! ```toml
//! [default]
//! host = "192.168.4.1"
//! secret = "1234"
//!
//! [proximity]
//! warning_cm = 25
//!
//! [rth]
//! rotate_ms = 650
//! ```

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use witank_client::{RecorderConfig, RthConfig, TeleopConfig};
use witank_driver::{DispatcherConfig, ProximityConfig, ScanConfig};

/// 默认配置文件路径
pub fn config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("无法确定配置目录")?;
    path.push("witank");
    path.push("config.toml");
    Ok(path)
}

/// `[default]` 段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSection {
    /// 控制器地址
    pub host: Option<String>,
    /// 发现探测密钥
    pub secret: Option<String>,
    /// 扫描基地址（本机在车辆热点上的 IP）
    pub base_ip: Option<String>,
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub default: DefaultSection,
    pub dispatcher: DispatcherConfig,
    pub proximity: ProximityConfig,
    pub scan: ScanConfig,
    pub recorder: RecorderConfig,
    pub teleop: TeleopConfig,
    pub rth: RthConfig,
}

impl CliConfig {
    /// 加载并校验配置；文件不存在时返回默认配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置（自动创建目录）
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let body = toml::to_string_pretty(self).context("序列化配置失败")?;
        let content = format!("# WiTank CLI Configuration\n\n{body}");
        fs::write(path, content).context("写入配置文件失败")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate().context("[dispatcher]")?;
        self.proximity.validate().context("[proximity]")?;
        self.scan.validate().context("[scan]")?;
        self.recorder.validate().context("[recorder]")?;
        self.rth.validate().context("[rth]")?;
        Ok(())
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 控制器地址
        #[arg(long)]
        host: Option<String>,

        /// 发现探测密钥
        #[arg(long)]
        secret: Option<String>,

        /// 扫描基地址
        #[arg(long)]
        base_ip: Option<String>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（host / secret / base_ip / all）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                host,
                secret,
                base_ip,
            } => Self::set_(path, host, secret, base_ip),

            ConfigCommand::Get { key } => Self::get_(path, &key),

            ConfigCommand::Check => Self::check_(path),
        }
    }

    fn set_(
        path: &Path,
        host: Option<String>,
        secret: Option<String>,
        base_ip: Option<String>,
    ) -> Result<()> {
        let mut config = CliConfig::load_from(path)?;

        if let Some(host) = host {
            println!("✅ 设置控制器地址: {host}");
            config.default.host = Some(host);
        }
        if let Some(secret) = secret {
            println!("✅ 设置探测密钥");
            config.default.secret = Some(secret);
        }
        if let Some(base_ip) = base_ip {
            println!("✅ 设置扫描基地址: {base_ip}");
            config.default.base_ip = Some(base_ip);
        }

        config.save_to(path)
    }

    fn get_(path: &Path, key: &str) -> Result<()> {
        let config = CliConfig::load_from(path)?;
        let value = match key {
            "host" => config.default.host,
            "secret" => config.default.secret,
            "base_ip" => config.default.base_ip,
            _ => {
                print!("{}", toml::to_string_pretty(&config).context("序列化配置失败")?);
                return Ok(());
            },
        };
        println!("{}", value.as_deref().unwrap_or("(未设置)"));
        Ok(())
    }

    fn check_(path: &Path) -> Result<()> {
        println!("配置文件: {}", path.display());
        if !path.exists() {
            println!("  (不存在，使用默认配置)");
        }

        let config = CliConfig::load_from(path)?;
        println!("  控制器地址: {:?}", config.default.host);
        println!("  扫描基地址: {:?}", config.default.base_ip);
        println!(
            "  距离阈值: danger ≤ {} cm, warning ≤ {} cm",
            config.proximity.danger_cm, config.proximity.warning_cm
        );
        println!("✅ 配置有效");
        Ok(())
    }
}
