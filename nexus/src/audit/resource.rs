//! リクエストパスからリソース種別・IDを導出する

use crate::audit::types::ResourceInfo;
use once_cell::sync::Lazy;
use regex::Regex;

/// リソース種別が判別できない場合の値
pub const UNKNOWN_RESOURCE: &str = "unknown";

/// `/api/[vN/]<type>[/<id>]`
static RESOURCE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/api/(?:v\d+/)?([^/]+)(?:/([^/]+))?").expect("valid resource path regex")
});

static VERSION_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v\d+$").expect("valid version segment regex"));

/// パスを`(resource_type, resource_id)`に分解する
///
/// クエリ文字列は無視する。API接頭辞に一致しないパスは`unknown`・IDなし。
pub fn extract_resource_info(path: &str) -> ResourceInfo {
    let path = path.split('?').next().unwrap_or_default();

    let Some(caps) = RESOURCE_PATH.captures(path) else {
        return ResourceInfo::unknown();
    };

    let resource_type = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    // `/api/v1`のようにバージョンだけのパスは種別なし
    if VERSION_SEGMENT.is_match(resource_type) {
        return ResourceInfo::unknown();
    }

    ResourceInfo {
        resource_type: resource_type.to_string(),
        resource_id: caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .filter(|id| !id.is_empty()),
    }
}

impl ResourceInfo {
    /// 判別不能なリソース
    pub fn unknown() -> Self {
        Self {
            resource_type: UNKNOWN_RESOURCE.to_string(),
            resource_id: None,
        }
    }
}
