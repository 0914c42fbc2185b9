//! 控制器 HTTP 接口格式
//!
//! 车载控制器（ESP 固件）只暴露三个接口：
//!
//! | 接口 | 方法 | 路径 | 说明 |
//! |------|------|------|------|
//! | 发现探测 | POST (form) | `/` | 表单字段 `password`，返回 JSON 设备信息 |
//! | 驱动命令 | GET | `/{a,b}/{maju,mundur,stop}` | 响应体忽略 |
//! | 距离读取 | GET | `/distance` | `{"distance": <厘米>}` |

use crate::{DriveAction, DriveChannel, ProtocolError};
use serde::Deserialize;

/// 发现探测表单字段名
pub const PROBE_SECRET_FIELD: &str = "password";

/// 距离读取路径
pub const DISTANCE_PATH: &str = "/distance";

/// 摄像头模块型号
pub const MODEL_CAMERA: &str = "CAM";

/// 电机控制器型号
pub const MODEL_CONTROLLER: &str = "RC";

/// 发现探测地址
pub fn probe_url(host: &str) -> String {
    format!("http://{host}/")
}

/// 驱动命令地址
pub fn drive_url(host: &str, channel: DriveChannel, action: DriveAction) -> String {
    format!("http://{host}/{}/{}", channel.as_str(), action.as_str())
}

/// 距离读取地址
pub fn distance_url(host: &str) -> String {
    format!("http://{host}{DISTANCE_PATH}")
}

// ============================================================================
// 发现响应
// ============================================================================

/// 发现探测的应答
///
/// 控制器与摄像头模块使用同一格式，`model` 区分两者。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryResponse {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub controller_id: Option<String>,
    #[serde(default)]
    pub cam_id: Option<String>,
}

impl DiscoveryResponse {
    /// 解析应答 JSON（忽略未知字段）
    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(body).map_err(|e| ProtocolError::MalformedBody(e.to_string()))
    }

    /// 认证是否通过
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// 型号是否匹配
    pub fn model_is(&self, model: &str) -> bool {
        self.model.as_deref() == Some(model)
    }

    /// 设备标识：优先 `cam_id`，其次 `controller_id`，都缺失时使用 `fallback`
    pub fn identifier(&self, fallback: &str) -> String {
        self.cam_id
            .as_deref()
            .or(self.controller_id.as_deref())
            .unwrap_or(fallback)
            .to_string()
    }
}

// ============================================================================
// 距离响应
// ============================================================================

/// 解析距离读数（厘米）
///
/// 先按 JSON 解析；固件偶尔返回非严格 JSON（多余字符、截断），
/// 此时退回到对 `"distance":<数字>` 的宽松扫描。两者都失败视为读取失败。
pub fn parse_distance(body: &str) -> Result<u32, ProtocolError> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return match value.get("distance") {
            Some(field) => field
                .as_u64()
                .and_then(|cm| u32::try_from(cm).ok())
                .ok_or_else(|| ProtocolError::InvalidValue {
                    field: "distance".to_string(),
                    value: field.to_string(),
                }),
            None => Err(ProtocolError::MissingField("distance")),
        };
    }
    scan_distance(body)
}

fn scan_distance(body: &str) -> Result<u32, ProtocolError> {
    let key = "\"distance\"";
    let start = body.find(key).ok_or(ProtocolError::MissingField("distance"))?;
    let rest = body[start + key.len()..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| ProtocolError::MalformedBody(body.to_string()))?
        .trim_start();
    let digits: &str = &rest[..rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len())];
    digits
        .parse::<u32>()
        .map_err(|_| ProtocolError::MalformedBody(body.to_string()))
}
