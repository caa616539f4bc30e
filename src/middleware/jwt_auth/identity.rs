use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::error::AuthError;

pub const SUBJECT_CLAIM: &str = "sub";
pub const SCOPE_CLAIM: &str = "scope";

/// 종류와 값으로 이루어진 클레임 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub kind: String,
    pub value: String,
}

/// 검증이 끝난 호출자 정보
///
/// 요청 확장으로 다운스트림에 전달되며 요청이 끝나면 버려집니다.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub scopes: BTreeSet<String>,
    /// 토큰 원본 클레임 (문자열이 아닌 값은 JSON 텍스트)
    pub raw_claims: BTreeMap<String, String>,
    claims: Vec<Claim>,
}

impl VerifiedIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        let subject = subject.into();
        let mut identity = Self {
            subject: subject.clone(),
            ..Self::default()
        };
        identity.add_claim(SUBJECT_CLAIM, subject);
        identity
    }

    /// 디코딩된 토큰 페이로드에서 만듭니다. `sub`가 없거나 비어 있으면 실패합니다.
    pub fn from_claims(payload: &Map<String, Value>) -> Result<Self, AuthError> {
        let subject = payload
            .get(SUBJECT_CLAIM)
            .and_then(Value::as_str)
            .filter(|sub| !sub.trim().is_empty())
            .ok_or_else(|| AuthError::authentication("The token has no subject"))?;

        let mut identity = Self::new(subject);
        for (name, value) in payload {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            identity.raw_claims.insert(name.clone(), text);

            if name == SUBJECT_CLAIM {
                continue;
            }
            match value {
                Value::String(s) => {
                    identity.add_claim(name, s.clone());
                }
                Value::Array(items) => {
                    for item in items.iter().filter_map(Value::as_str) {
                        identity.add_claim(name, item);
                    }
                }
                Value::Number(_) | Value::Bool(_) => {
                    identity.add_claim(name, value.to_string());
                }
                _ => {}
            }
        }
        Ok(identity)
    }

    /// 같은 종류와 값의 클레임이 이미 있으면 추가하지 않고 `false`를 반환합니다.
    pub fn add_claim(&mut self, kind: impl Into<String>, value: impl Into<String>) -> bool {
        let claim = Claim {
            kind: kind.into(),
            value: value.into(),
        };
        if self.claims.contains(&claim) {
            return false;
        }
        self.claims.push(claim);
        true
    }

    pub fn has_claim(&self, kind: &str, value: &str) -> bool {
        self.claims.iter().any(|c| c.kind == kind && c.value == value)
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn claims_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.kind == kind)
            .map(|c| c.value.as_str())
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// 공백으로 구분된 `scope` 클레임을 개별 클레임으로 나눕니다.
    ///
    /// 여러 번 호출해도 같은 값이 중복되지 않습니다.
    pub fn normalize_scopes(&mut self) {
        let (composite, rest): (Vec<Claim>, Vec<Claim>) = std::mem::take(&mut self.claims)
            .into_iter()
            .partition(|c| c.kind == SCOPE_CLAIM && c.value.split_whitespace().nth(1).is_some());
        self.claims = rest;

        for claim in composite {
            for scope in claim.value.split_whitespace() {
                self.add_claim(SCOPE_CLAIM, scope);
            }
        }

        self.claims.retain(|c| c.kind != SCOPE_CLAIM || !c.value.trim().is_empty());
        self.scopes = self
            .claims_of(SCOPE_CLAIM)
            .map(|s| s.trim().to_string())
            .collect();
    }

    /// 로그에 남길 공백 구분 스코프 목록
    pub fn scope_list(&self) -> String {
        self.scopes.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}
