use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::api::models::StatsResponse;
use crate::cache::ResponseCache;
use crate::db::{self, models::Role, DbPool};
use crate::indexer::{self, SearchIndex};
use crate::publisher::{Publisher, PublishReport, SqlitePublicationStore};
use crate::utils::sanitize::truncate;
use crate::{Error, Result};

/// Publish due chapters once, outside the server
pub async fn publish_due(pool: &DbPool) -> Result<PublishReport> {
    // The server cache lives in another process; its entries expire on their own
    let store = SqlitePublicationStore::new(pool.clone(), ResponseCache::new(Default::default()));
    let publisher = Publisher::new(store, chrono::Duration::zero());
    publisher.publish_due(Utc::now()).await
}

pub fn print_publish_report(report: &PublishReport) {
    println!("Checked {} due chapter(s)", report.checked);
    for chapter in &report.published {
        println!(
            "  \u{2713} {} chapter {}: {}",
            chapter.story_slug, chapter.chapter_number, chapter.title
        );
    }
    if report.already_published > 0 {
        println!("  {} already published elsewhere", report.already_published);
    }
    for failure in &report.failed {
        println!(
            "  \u{2717} {} chapter {}: {}",
            failure.story_slug, failure.chapter_number, failure.error
        );
    }
}

/// Rebuild the search index from the database
pub async fn reindex(pool: &DbPool, index: &SearchIndex) -> Result<usize> {
    indexer::rebuild_from_db(pool, index).await
}

pub async fn promote(pool: &DbPool, username: &str) -> Result<()> {
    db::users::set_role(pool, username, Role::Admin).await
}

/// Fetch site statistics from a running server
pub async fn stats(server_url: &str) -> Result<StatsResponse> {
    let client = Client::new();
    let url = format!("{}/api/stats", server_url.trim_end_matches('/'));

    let response = client.get(&url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

pub fn print_stats(stats: &StatsResponse) {
    println!("Users:              {}", stats.users);
    println!("Public stories:     {}", stats.public_stories);
    println!("Published chapters: {}", stats.published_chapters);
    println!("Scheduled chapters: {}", stats.scheduled_chapters);
    println!("Words published:    {}", stats.total_words);
}

/// Search stories on a running server
pub async fn search(server_url: &str, query: &str, page: usize) -> Result<SearchResponse> {
    if query.trim().is_empty() {
        return Err(Error::Validation("Search query must not be empty".to_string()));
    }

    let client = Client::new();
    let url = format!(
        "{}/api/search?q={}&page={page}",
        server_url.trim_end_matches('/'),
        urlencoding::encode(query)
    );

    let response = client.get(&url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

pub fn print_search_results(results: &SearchResponse) {
    if results.stories.is_empty() {
        println!("No stories found");
        return;
    }

    println!("\nFound {} stories:\n", results.pagination.total);
    println!("{:<40} {:<20} {:<10}", "Title", "Author", "Chapters");
    println!("{}", "-".repeat(72));

    for story in &results.stories {
        println!(
            "{:<40} {:<20} {:<10}",
            truncate(&story.title, 38),
            truncate(&story.author_username, 18),
            story.published_chapters
        );
    }

    println!(
        "\nPage {} of {}",
        results.pagination.page, results.pagination.total_pages
    );
}

// Response types (matching API models)

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub stories: Vec<StoryCard>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct StoryCard {
    pub slug: String,
    pub title: String,
    pub author_username: String,
    pub published_chapters: i64,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewUser;

    #[tokio::test]
    async fn test_stats_fetches_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"users":3,"public_stories":2,"published_chapters":7,"scheduled_chapters":1,"total_words":12000}"#,
            )
            .create_async()
            .await;

        let stats = stats(&server.url()).await.unwrap();
        assert_eq!(stats.users, 3);
        assert_eq!(stats.total_words, 12000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/search")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("q".into(), "space opera".into()),
                mockito::Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"stories":[{"slug":"stars","title":"Stars","author_username":"vega","published_chapters":4,"tags":[]}],
                    "pagination":{"page":2,"limit":20,"total":21,"total_pages":2}}"#,
            )
            .create_async()
            .await;

        let results = search(&server.url(), "space opera", 2).await.unwrap();
        assert_eq!(results.stories.len(), 1);
        assert_eq!(results.stories[0].slug, "stars");
        assert_eq!(results.pagination.total_pages, 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_surface_as_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/stats")
            .with_status(500)
            .create_async()
            .await;

        assert!(matches!(stats(&server.url()).await, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn test_promote_sets_admin_role() {
        let pool = db::init_memory_db().await.unwrap();
        db::users::create_user(
            &pool,
            &NewUser {
                username: "editor".to_string(),
                email: "editor@example.com".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
            },
        )
        .await
        .unwrap();

        promote(&pool, "editor").await.unwrap();
        let user = db::users::get_user_by_username(&pool, "editor").await.unwrap();
        assert_eq!(user.role, Role::Admin);

        assert!(matches!(
            promote(&pool, "nobody").await,
            Err(Error::NotFound(_))
        ));
    }
}
