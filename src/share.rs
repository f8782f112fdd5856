//! Share links: `/share?ids=1,2,3`.
//!
//! A link is an unsigned list of record ids. Anyone holding it can view the
//! records' descriptive fields and QR images, and any tenant can copy them
//! into its own stock.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::model::{EsimRecord, NewEsim};
use crate::storage::InventoryStore;

pub const SHARE_PATH: &str = "/share";

/// Base used to resolve pasted relative links such as `/share?ids=1`.
pub(crate) const PLACEHOLDER_ORIGIN: &str = "http://localhost";

lazy_static! {
    static ref IDS_FRAGMENT: Regex = Regex::new(r"ids=([^&\s#]+)").unwrap();
}

/// Builds the link path for `ids`, dropping non-positive ids and repeats.
pub fn share_link(ids: &[i64]) -> String {
    let mut seen = BTreeSet::new();
    let joined = ids
        .iter()
        .copied()
        .filter(|id| *id > 0 && seen.insert(*id))
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{SHARE_PATH}?ids={joined}")
}

/// Splits a comma-separated `ids` value, keeping positive integers in order.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect()
}

type IdsStrategy = fn(&str) -> Option<String>;

/// Tried in order; the first one that finds an `ids` value wins.
const STRATEGIES: [IdsStrategy; 3] = [ids_from_absolute_url, ids_from_relative_url, ids_from_fragment];

fn ids_query_value(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "ids")
        .map(|(_, value)| value.into_owned())
}

fn ids_from_absolute_url(input: &str) -> Option<String> {
    Url::parse(input).ok().as_ref().and_then(ids_query_value)
}

fn ids_from_relative_url(input: &str) -> Option<String> {
    let base = Url::parse(PLACEHOLDER_ORIGIN).ok()?;
    base.join(input).ok().as_ref().and_then(ids_query_value)
}

fn ids_from_fragment(input: &str) -> Option<String> {
    IDS_FRAGMENT
        .captures(input)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().to_string())
}

/// Extracts ids from one pasted line: a full URL, a relative link, or any text
/// that contains an `ids=` fragment.
pub fn parse_ids_from_share_url(input: &str) -> Vec<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(trimmed))
        .map(|raw| {
            let value = raw.split_whitespace().next().unwrap_or_default();
            parse_id_list(value)
        })
        .unwrap_or_default()
}

/// Union of ids over every non-blank line of a pasted blob.
pub fn parse_share_input(blob: &str) -> BTreeSet<i64> {
    blob.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(parse_ids_from_share_url)
        .collect()
}

/// What the public share view exposes. Customer and price fields are absent
/// by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedEsim {
    pub id: i64,
    pub country: Option<String>,
    pub plan_name: Option<String>,
    pub qr_path: Option<String>,
}

impl From<&EsimRecord> for SharedEsim {
    fn from(record: &EsimRecord) -> Self {
        Self {
            id: record.id,
            country: record.country.clone(),
            plan_name: record.plan_name.clone(),
            qr_path: record.qr_path.clone(),
        }
    }
}

/// Looks up the records behind an `ids` query value across every tenant.
pub async fn resolve_share(store: &dyn InventoryStore, raw_ids: &str) -> AppResult<Vec<SharedEsim>> {
    let ids = parse_id_list(raw_ids);
    if ids.is_empty() {
        return Err(AppError::not_found("share link has no ids"));
    }

    let records = store.find_esims_by_ids(&ids, None).await?;
    if records.is_empty() {
        return Err(AppError::not_found("no eSIM behind this share link"));
    }

    Ok(records.iter().map(SharedEsim::from).collect())
}

/// Turns a foreign record into fresh stock for `importer_store_id`.
///
/// Only descriptive and commercial fields are carried over; status,
/// customer attribution and ownership start from scratch.
pub fn stock_copy_for(source: &EsimRecord, importer_store_id: i64) -> NewEsim {
    NewEsim {
        store_id: Some(importer_store_id),
        details: source.details(),
    }
}
