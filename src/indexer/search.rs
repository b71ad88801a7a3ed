use crate::db::models::StorySummary;
use crate::error::{Error, Result};
use crate::indexer::schema::StorySchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, Query, QueryParser};
use tantivy::schema::OwnedValue;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

const WRITER_BUFFER_BYTES: usize = 50_000_000;

pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    schema: StorySchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub story_id: i64,
    pub slug: String,
    pub title: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

fn text_value(doc: &TantivyDocument, field: tantivy::schema::Field) -> Option<String> {
    match doc.get_first(field)? {
        OwnedValue::Str(s) => Some(s.to_string()),
        _ => None,
    }
}

impl SearchIndex {
    /// Create or open search index
    pub fn new(index_path: impl AsRef<Path>) -> Result<Self> {
        let path = index_path.as_ref();
        let schema = StorySchema::new();

        std::fs::create_dir_all(path)?;

        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)
                .map_err(|e| Error::Search(format!("Failed to open index: {e}")))?
        } else {
            Index::create_in_dir(path, schema.schema.clone())
                .map_err(|e| Error::Search(format!("Failed to create index: {e}")))?
        };

        info!("Search index initialized at {:?}", path);
        Self::from_index(index, schema)
    }

    /// Index held in memory
    pub fn in_memory() -> Result<Self> {
        let schema = StorySchema::new();
        let index = Index::create_in_ram(schema.schema.clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: StorySchema) -> Result<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| Error::Search(format!("Failed to create reader: {e}")))?;

        let writer = index
            .writer(WRITER_BUFFER_BYTES)
            .map_err(|e| Error::Search(format!("Failed to create writer: {e}")))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            schema,
        })
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>> {
        self.writer
            .lock()
            .map_err(|_| Error::Search("Index writer lock poisoned".to_string()))
    }

    fn story_document(&self, story: &StorySummary, tags: &[String]) -> TantivyDocument {
        let mut doc = doc!(
            self.schema.id => story.id,
            self.schema.slug => story.slug.clone(),
            self.schema.title => story.title.clone(),
            self.schema.author => story.author_username.clone(),
        );

        if let Some(description) = &story.description {
            doc.add_text(self.schema.description, description);
        }
        if let Some(genre) = &story.genre {
            doc.add_text(self.schema.genre, genre);
        }
        if let Some(display_name) = &story.author_display_name {
            doc.add_text(self.schema.author, display_name);
        }
        for tag in tags {
            doc.add_text(self.schema.tags, tag);
        }

        doc
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
        writer
            .commit()
            .map_err(|e| Error::Search(format!("Failed to commit: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| Error::Search(format!("Failed to reload reader: {e}")))?;
        Ok(())
    }

    /// Index a story, replacing any previous document; non-public stories are removed
    pub fn upsert_story(&self, story: &StorySummary, tags: &[String]) -> Result<()> {
        let mut writer = self.lock_writer()?;
        writer.delete_term(Term::from_field_i64(self.schema.id, story.id));

        if story.visibility == crate::db::models::Visibility::Public {
            debug!("Indexing story {}", story.id);
            writer.add_document(self.story_document(story, tags))?;
        } else {
            debug!("Removing non-public story {} from index", story.id);
        }

        self.commit(&mut writer)
    }

    pub fn delete_story(&self, story_id: i64) -> Result<()> {
        let mut writer = self.lock_writer()?;
        writer.delete_term(Term::from_field_i64(self.schema.id, story_id));
        self.commit(&mut writer)
    }

    /// Replace the whole index with the given public stories
    pub fn rebuild(&self, stories: &[(StorySummary, Vec<String>)]) -> Result<usize> {
        let mut writer = self.lock_writer()?;
        writer.delete_all_documents()?;

        let mut indexed = 0;
        for (story, tags) in stories {
            if story.visibility != crate::db::models::Visibility::Public {
                continue;
            }
            writer.add_document(self.story_document(story, tags))?;
            indexed += 1;
        }

        self.commit(&mut writer)?;
        info!("Rebuilt search index with {} stories", indexed);
        Ok(indexed)
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Search stories; unparseable parts of the query are ignored
    pub fn search(&self, query: &SearchQuery, max_limit: usize) -> Result<SearchResults> {
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, self.schema.default_fields());

        let tantivy_query: Box<dyn Query> = if query.q.trim().is_empty() {
            Box::new(AllQuery)
        } else {
            let (parsed, errors) = query_parser.parse_query_lenient(&query.q);
            if !errors.is_empty() {
                warn!("Ignored {} invalid part(s) of search query", errors.len());
            }
            parsed
        };

        let page = query.page.max(1);
        let limit = query.limit.clamp(1, max_limit.max(1));
        let offset = (page - 1) * limit;

        let (top_docs, total) = searcher
            .search(
                &*tantivy_query,
                &(TopDocs::with_limit(limit).and_offset(offset), Count),
            )
            .map_err(|e| Error::Search(format!("Search failed: {e}")))?;

        let hits: Vec<SearchHit> = top_docs
            .into_iter()
            .filter_map(|(score, doc_address)| {
                let doc = searcher.doc::<TantivyDocument>(doc_address).ok()?;

                let story_id = match doc.get_first(self.schema.id)? {
                    OwnedValue::I64(id) => *id,
                    _ => return None,
                };

                Some(SearchHit {
                    story_id,
                    slug: text_value(&doc, self.schema.slug)?,
                    title: text_value(&doc, self.schema.title)?,
                    score,
                })
            })
            .collect();

        Ok(SearchResults {
            hits,
            total,
            page,
            total_pages: total.div_ceil(limit),
        })
    }
}
