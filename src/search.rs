//! Keyword search over the active listing.
//!
//! Matching is a case-insensitive substring test against todo titles and detail
//! descriptions. Results keep listing order; there is no ranking.

use serde::{Deserialize, Serialize};

use crate::db::{todos::list_todos, DbPool};
use crate::error::AppError;
use crate::models::TodoWithDetails;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMeta {
    pub title_match: bool,
    pub matching_detail_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub todo: TodoWithDetails,
    pub search_meta: SearchMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub total_todos: usize,
    pub title_matches: usize,
    pub detail_matches: usize,
    pub total_detail_matches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub stats: SearchStats,
}

pub fn search_todos(todos: Vec<TodoWithDetails>, query: &str) -> SearchResults {
    let query = query.trim();
    let mut results = Vec::new();
    let mut stats = SearchStats::default();

    if query.is_empty() {
        return SearchResults {
            query: String::new(),
            results,
            stats,
        };
    }

    let needle = query.to_lowercase();
    for todo in todos {
        let title_match = todo.todo.title.to_lowercase().contains(&needle);
        let matching_detail_ids: Vec<i64> = todo
            .todo_details
            .iter()
            .filter(|detail| {
                detail
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .map(|detail| detail.id)
            .collect();

        if !title_match && matching_detail_ids.is_empty() {
            continue;
        }

        stats.total_todos += 1;
        if title_match {
            stats.title_matches += 1;
        }
        if !matching_detail_ids.is_empty() {
            stats.detail_matches += 1;
            stats.total_detail_matches += matching_detail_ids.len();
        }

        results.push(SearchHit {
            todo,
            search_meta: SearchMeta {
                title_match,
                matching_detail_ids,
            },
        });
    }

    SearchResults {
        query: query.to_string(),
        results,
        stats,
    }
}

pub fn search(pool: &DbPool, user_id: i64, query: &str) -> Result<SearchResults, AppError> {
    let todos = list_todos(pool, user_id)?;
    Ok(search_todos(todos, query))
}
