//! Saving the three-slot source form.
//!
//! The form is diffed against the user's persisted sources and turned into the
//! smallest set of inserts, updates and deletes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{ConfigDraft, Source, SourceFields, UserConfig};
use crate::store::Store;

pub const MAX_SOURCE_SLOTS: usize = 3;

/// Keywords used for the aggregate config when the first slot has none.
pub const FALLBACK_KEYWORD: &str = "general";

/// Keywords as sent by the form: a list, or one comma-separated string.
///
/// Anything else (null, numbers, objects) reads as an empty list, and
/// non-string list items are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KeywordsInput {
    List(Vec<String>),
    Text(String),
}

impl Default for KeywordsInput {
    fn default() -> Self {
        KeywordsInput::List(Vec::new())
    }
}

impl<'de> Deserialize<'de> for KeywordsInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => KeywordsInput::Text(text),
            Value::Array(items) => KeywordsInput::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(keyword) => Some(keyword),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => KeywordsInput::default(),
        })
    }
}

impl KeywordsInput {
    /// Trimmed, non-empty keywords in input order.
    pub fn normalize(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            KeywordsInput::List(items) => items.iter().map(String::as_str).collect(),
            KeywordsInput::Text(text) => text.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One slot of the source form.
///
/// Blank or malformed ids mean "new slot"; non-string text fields read as
/// empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInput {
    #[serde(default, deserialize_with = "loose_id")]
    pub id: Option<Uuid>,
    #[serde(default, deserialize_with = "loose_text")]
    pub url: String,
    #[serde(default)]
    pub keywords: KeywordsInput,
    #[serde(default, deserialize_with = "loose_text")]
    pub viewpoint: String,
}

fn loose_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => Uuid::parse_str(id.trim()).ok(),
        _ => None,
    })
}

fn loose_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

/// Writes needed to make the persisted sources match the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePlan {
    pub inserts: Vec<SourceFields>,
    pub updates: Vec<(Uuid, SourceFields)>,
    pub deletes: Vec<Uuid>,
}

impl SourcePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

struct Desired {
    id: Option<Uuid>,
    fields: SourceFields,
}

/// Slots with a URL, normalized, keeping only the first slot per URL.
fn desired_sources(inputs: &[SourceInput]) -> Vec<Desired> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .filter_map(|input| {
            let url = input.url.trim();
            if url.is_empty() || !seen.insert(url.to_string()) {
                return None;
            }
            Some(Desired {
                id: input.id,
                fields: SourceFields {
                    url: url.to_string(),
                    keywords: input.keywords.normalize(),
                    viewpoint: input.viewpoint.clone(),
                },
            })
        })
        .collect()
}

/// Diff the form against `existing`.
///
/// A slot claims an existing row by id first; remaining slots then claim an
/// unclaimed row with the same URL. Each row is claimed at most once. Claimed
/// rows are updated, unclaimed slots inserted and unclaimed rows deleted.
pub fn plan_sources(inputs: &[SourceInput], existing: &[Source]) -> SourcePlan {
    let desired = desired_sources(inputs);
    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut matches: Vec<Option<Uuid>> = vec![None; desired.len()];

    for (slot, wanted) in desired.iter().enumerate() {
        if let Some(id) = wanted.id {
            if existing.iter().any(|row| row.id == id) && claimed.insert(id) {
                matches[slot] = Some(id);
            }
        }
    }

    for (slot, wanted) in desired.iter().enumerate() {
        if matches[slot].is_some() {
            continue;
        }
        let by_url = existing
            .iter()
            .find(|row| row.url == wanted.fields.url && !claimed.contains(&row.id));
        if let Some(row) = by_url {
            claimed.insert(row.id);
            matches[slot] = Some(row.id);
        }
    }

    let mut plan = SourcePlan::default();
    for (wanted, matched) in desired.into_iter().zip(matches) {
        match matched {
            Some(id) => plan.updates.push((id, wanted.fields)),
            None => plan.inserts.push(wanted.fields),
        }
    }
    plan.deletes = existing
        .iter()
        .filter(|row| !claimed.contains(&row.id))
        .map(|row| row.id)
        .collect();
    plan
}

/// The aggregate `user_configs` row, taken from the first slot with a URL.
pub fn aggregate_config(inputs: &[SourceInput]) -> ConfigDraft {
    let first = desired_sources(inputs).into_iter().next();

    let (keywords, viewpoint) = match first {
        Some(d) => (d.fields.keywords, d.fields.viewpoint.trim().to_string()),
        None => (Vec::new(), String::new()),
    };

    ConfigDraft {
        keywords: if keywords.is_empty() {
            vec![FALLBACK_KEYWORD.to_string()]
        } else {
            keywords
        },
        viewpoint,
        schedule_cron: None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub config: UserConfig,
    pub sources: Vec<Source>,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Persist the source form for `user` and refresh the aggregate config.
///
/// Source writes go first; the config upsert runs only once they succeed.
#[instrument(skip(store, user, inputs), fields(user_id = %user.id))]
pub async fn save_sources(
    store: &dyn Store,
    user: &AuthUser,
    inputs: &[SourceInput],
) -> ApiResult<SaveOutcome> {
    if inputs.len() > MAX_SOURCE_SLOTS {
        return Err(ApiError::BadRequest(format!(
            "소스는 최대 {}개까지 설정할 수 있습니다.",
            MAX_SOURCE_SLOTS
        )));
    }

    let existing = store.sources(user, None).await?;
    let plan = plan_sources(inputs, &existing);
    info!(
        inserts = plan.inserts.len(),
        updates = plan.updates.len(),
        deletes = plan.deletes.len(),
        "saving sources"
    );

    if !plan.is_empty() {
        store.apply_source_plan(user, &plan).await?;
    }

    let config = store
        .upsert_user_config(user, &aggregate_config(inputs))
        .await?;
    let sources = store.sources(user, None).await?;

    Ok(SaveOutcome {
        config,
        sources,
        inserted: plan.inserts.len(),
        updated: plan.updates.len(),
        deleted: plan.deletes.len(),
    })
}
