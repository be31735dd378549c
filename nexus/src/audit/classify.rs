//! アクション分類とセキュリティアクション判定

use crate::audit::types::AuditAction;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// HTTPメソッドを監査アクションに変換する
///
/// POST→create、PUT/PATCH→update、DELETE→delete、それ以外は小文字化したメソッド名。
pub fn method_to_action(method: &str) -> AuditAction {
    match method.to_ascii_uppercase().as_str() {
        "POST" => AuditAction::Create,
        "PUT" | "PATCH" => AuditAction::Update,
        "DELETE" => AuditAction::Delete,
        _ => AuditAction::Other(method.to_ascii_lowercase()),
    }
}

type BodyPredicate = fn(Option<&Value>) -> bool;

/// セキュリティアクション判定ルール
struct SecurityRule {
    methods: &'static [&'static str],
    path: Regex,
    body: Option<BodyPredicate>,
    description: &'static str,
}

impl SecurityRule {
    fn new(
        methods: &'static [&'static str],
        pattern: &str,
        body: Option<BodyPredicate>,
        description: &'static str,
    ) -> Self {
        Self {
            methods,
            path: Regex::new(pattern).expect("valid security rule regex"),
            body,
            description,
        }
    }

    fn matches(&self, method: &str, path: &str, body: Option<&Value>) -> bool {
        self.methods.iter().any(|m| *m == method)
            && self.path.is_match(path)
            && self.body.map_or(true, |predicate| predicate(body))
    }
}

const WRITES: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];
const CREATE: &[&str] = &["POST"];

static SECURITY_RULES: Lazy<Vec<SecurityRule>> = Lazy::new(|| {
    vec![
        SecurityRule::new(
            WRITES,
            r"^/api/(?:v\d+/)?vulnerabilities(?:/|$)",
            None,
            "vulnerability write",
        ),
        SecurityRule::new(
            CREATE,
            r"^/api/(?:v\d+/)?incidents/?$",
            None,
            "incident creation",
        ),
        SecurityRule::new(
            WRITES,
            r"^/api/(?:v\d+/)?users(?:/|$)",
            None,
            "user write",
        ),
        SecurityRule::new(
            CREATE,
            r"^/api/(?:v\d+/)?changes/?$",
            Some(has_security_change_flag),
            "security change request",
        ),
        SecurityRule::new(
            CREATE,
            r"^/api/(?:v\d+/)?auth/(?:login|register)/?$",
            None,
            "authentication attempt",
        ),
    ]
});

/// `is_security_change`が真値（1 / true / "1" / "true"）か
fn has_security_change_flag(body: Option<&Value>) -> bool {
    match body.and_then(|b| b.get("is_security_change")) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
        _ => false,
    }
}

/// セキュリティ関連アクションか判定する
///
/// ルールのいずれかに一致すればtrue（評価順は結果に影響しない）。
pub fn is_security_action(method: &str, path: &str, body: Option<&Value>) -> bool {
    let method = method.to_ascii_uppercase();
    let path = path.split('?').next().unwrap_or_default();

    match SECURITY_RULES
        .iter()
        .find(|rule| rule.matches(&method, path, body))
    {
        Some(rule) => {
            tracing::trace!(rule = rule.description, method = %method, path, "Security action matched");
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_to_action() {
        assert_eq!(method_to_action("POST"), AuditAction::Create);
        assert_eq!(method_to_action("PUT"), AuditAction::Update);
        assert_eq!(method_to_action("PATCH"), AuditAction::Update);
        assert_eq!(method_to_action("DELETE"), AuditAction::Delete);
        assert_eq!(
            method_to_action("OPTIONS"),
            AuditAction::Other("options".to_string())
        );
        assert_eq!(method_to_action("OPTIONS").as_str(), "options");
        assert_eq!(method_to_action("post"), AuditAction::Create);
    }

    #[test]
    fn test_vulnerability_writes_are_security_actions() {
        assert!(is_security_action("PUT", "/api/vulnerabilities/1", Some(&json!({}))));
        assert!(is_security_action("POST", "/api/v1/vulnerabilities", None));
        assert!(is_security_action("DELETE", "/api/v1/vulnerabilities/CVE-1", None));
    }

    #[test]
    fn test_incident_creation_is_security_action() {
        assert!(is_security_action("POST", "/api/v1/incidents", None));
        assert!(!is_security_action("PUT", "/api/v1/incidents/INC-1", None));
    }

    #[test]
    fn test_user_writes_are_security_actions() {
        assert!(is_security_action("PUT", "/api/users/5", None));
        assert!(is_security_action("DELETE", "/api/v1/users/5", None));
        assert!(!is_security_action("POST", "/api/v1/usersettings", None));
    }

    #[test]
    fn test_security_change_flag() {
        assert!(!is_security_action(
            "POST",
            "/api/changes",
            Some(&json!({"is_security_change": 0}))
        ));
        assert!(is_security_action(
            "POST",
            "/api/changes",
            Some(&json!({"is_security_change": 1}))
        ));
        assert!(is_security_action(
            "POST",
            "/api/v1/changes",
            Some(&json!({"is_security_change": true}))
        ));
        assert!(is_security_action(
            "POST",
            "/api/v1/changes",
            Some(&json!({"is_security_change": "true"}))
        ));
        assert!(!is_security_action("POST", "/api/v1/changes", None));
        assert!(!is_security_action(
            "PUT",
            "/api/v1/changes/3",
            Some(&json!({"is_security_change": 1}))
        ));
    }

    #[test]
    fn test_authentication_attempts() {
        assert!(is_security_action("POST", "/api/v1/auth/login", None));
        assert!(is_security_action("POST", "/api/auth/register", None));
        assert!(!is_security_action("POST", "/api/v1/auth/logout", None));
    }

    #[test]
    fn test_ordinary_writes_are_not_security_actions() {
        assert!(!is_security_action("POST", "/api/v1/problems", None));
        assert!(!is_security_action("PUT", "/api/v1/assets/A-1", None));
        assert!(!is_security_action("BOGUS METHOD", "/api/v1/users", None));
    }
}
