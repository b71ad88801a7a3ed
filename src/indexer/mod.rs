// Full-text search over public stories

pub mod schema;
pub mod search;

pub use schema::StorySchema;
pub use search::{SearchHit, SearchIndex, SearchQuery, SearchResults};

use crate::db::{self, DbPool};
use crate::error::Result;

/// Rebuild the whole index from the public stories in the database
pub async fn rebuild_from_db(pool: &DbPool, index: &SearchIndex) -> Result<usize> {
    let stories = db::stories::list_all_public(pool).await?;
    let ids: Vec<i64> = stories.iter().map(|s| s.id).collect();
    let mut tags = db::tags::get_tags_for_stories(pool, &ids).await?;

    let documents: Vec<_> = stories
        .into_iter()
        .map(|story| {
            let story_tags = tags.remove(&story.id).unwrap_or_default();
            (story, story_tags)
        })
        .collect();

    index.rebuild(&documents)
}
