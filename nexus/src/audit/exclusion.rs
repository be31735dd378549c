//! 監査対象外リクエストの判定

use once_cell::sync::Lazy;
use regex::Regex;

/// メソッドに関係なく監査しないパス
static EXCLUDED_PATHS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^/health(?:/|$)",
        r"^/api/(?:v\d+/)?health(?:/|$)",
        r"^/metrics/?$",
        r"^/api-docs(?:/|$)",
        // 監査ログ閲覧APIそのもの
        r"^/api/(?:v\d+/)?audit-logs(?:/|$)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid exclusion regex"))
    .collect()
});

/// 監査対象外ならtrue
///
/// GET（およびHEAD）は変更操作ではないため常に対象外。
pub fn is_excluded_path(path: &str, method: &str) -> bool {
    if method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD") {
        return true;
    }
    let path = path.split('?').next().unwrap_or_default();
    EXCLUDED_PATHS.iter().any(|re| re.is_match(path))
}
