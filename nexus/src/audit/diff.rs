//! 変更前後の差分計算

use crate::audit::types::{AuditDiff, FieldChange};
use serde_json::Value;

/// 変更前後のオブジェクトを比較する
///
/// どちらかが欠損、またはオブジェクトでない場合はNone。
/// 差がない場合も空の構造ではなくNoneを返す。
pub fn diff(prior: Option<&Value>, new: Option<&Value>) -> Option<AuditDiff> {
    let prior = prior?.as_object()?;
    let new = new?.as_object()?;

    let mut result = AuditDiff::default();

    for (key, new_value) in new {
        match prior.get(key) {
            None => {
                result.added.insert(key.clone(), new_value.clone());
            }
            // serde_json::Valueの比較は構造比較
            Some(prior_value) if prior_value != new_value => {
                result.changed.insert(
                    key.clone(),
                    FieldChange {
                        from: prior_value.clone(),
                        to: new_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, prior_value) in prior {
        if !new.contains_key(key) {
            result.removed.insert(key.clone(), prior_value.clone());
        }
    }

    (!result.is_empty()).then_some(result)
}
