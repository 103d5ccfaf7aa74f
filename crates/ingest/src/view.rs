//! Latest-value view of a workplace.
//!
//! Every read runs inside one transaction so the view reflects a single
//! consistent state of the history store. Latest values come from one ranked
//! query over the workplace's whole item population; nothing here issues a
//! query per item or per column.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use sqlx::SqlitePool;

use bugwatch_storage::{CatalogStore, HistoryStore, SavedSearchStore, Workplace};

use crate::error::ViewError;

/// Value shown for a column an item has never reported.
pub const UNKNOWN_VALUE: &str = "N/A";

#[derive(Debug, Clone, Serialize)]
pub struct WorkplaceView {
    pub workplace: Workplace,
    pub columns: Vec<String>,
    pub sections: Vec<Section>,
}

/// The items one saved search has returned.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub search_id: i64,
    pub search_name: String,
    pub details: String,
    pub rows: Vec<ItemRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    pub item_id: i64,
    /// Column name to current value, in column order.
    pub values: IndexMap<String, String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Every workplace that owns a search containing this item.
    pub workplaces: Vec<Workplace>,
}

pub async fn build_view(pool: &SqlitePool, workplace_id: i64) -> Result<WorkplaceView, ViewError> {
    let mut tx = pool.begin().await?;

    let workplace = CatalogStore::get_workplace(&mut tx, workplace_id)
        .await?
        .ok_or(ViewError::WorkplaceNotFound(workplace_id))?;
    let columns: Vec<String> = CatalogStore::visible_columns(&mut tx, workplace_id)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    let searches = SavedSearchStore::list_for_workplace(&mut tx, workplace_id).await?;
    let memberships = HistoryStore::workplace_memberships(&mut tx, workplace_id).await?;
    let latest = HistoryStore::latest_values(&mut tx, workplace_id).await?;
    let updated = HistoryStore::last_updated(&mut tx, workplace_id).await?;
    let owners = HistoryStore::item_workplaces(&mut tx, workplace_id).await?;
    tx.commit().await?;

    let mut values: HashMap<i64, HashMap<String, String>> = HashMap::new();
    for v in latest {
        values.entry(v.item_id).or_default().insert(v.field_name, v.field_value);
    }
    let last_updated: HashMap<i64, DateTime<Utc>> =
        updated.into_iter().map(|u| (u.item_id, u.last_updated)).collect();
    let mut item_owners: HashMap<i64, Vec<Workplace>> = HashMap::new();
    for o in owners {
        item_owners.entry(o.item_id).or_default().push(Workplace {
            id: o.workplace_id,
            name: o.workplace_name,
        });
    }
    let mut items_by_search: HashMap<i64, Vec<i64>> = HashMap::new();
    for m in memberships {
        items_by_search.entry(m.search_id).or_default().push(m.item_id);
    }

    let sections = searches
        .into_iter()
        .map(|search| {
            let rows = items_by_search
                .remove(&search.id)
                .unwrap_or_default()
                .into_iter()
                .map(|item_id| {
                    let known = values.get(&item_id);
                    let row_values = columns
                        .iter()
                        .map(|column| {
                            let value = known
                                .and_then(|fields| fields.get(column))
                                .cloned()
                                .unwrap_or_else(|| UNKNOWN_VALUE.to_string());
                            (column.clone(), value)
                        })
                        .collect();
                    ItemRow {
                        item_id,
                        values: row_values,
                        last_updated: last_updated.get(&item_id).copied(),
                        workplaces: item_owners.get(&item_id).cloned().unwrap_or_default(),
                    }
                })
                .collect();
            Section {
                search_id: search.id,
                search_name: search.name,
                details: search.details,
                rows,
            }
        })
        .collect();

    Ok(WorkplaceView { workplace, columns, sections })
}
