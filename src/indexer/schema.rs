use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING, TEXT};

/// Schema for the story search index
#[derive(Clone)]
pub struct StorySchema {
    pub schema: Schema,
    pub id: Field,
    pub slug: Field,
    pub title: Field,
    pub description: Field,
    pub tags: Field,
    pub genre: Field,
    pub author: Field,
}

impl StorySchema {
    pub fn new() -> Self {
        let mut schema_builder = Schema::builder();

        // Indexed so updates can delete by id
        let id = schema_builder.add_i64_field("id", INDEXED | STORED | FAST);
        let slug = schema_builder.add_text_field("slug", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let description = schema_builder.add_text_field("description", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT | STORED);
        let genre = schema_builder.add_text_field("genre", TEXT | STORED);
        let author = schema_builder.add_text_field("author", TEXT | STORED);

        let schema = schema_builder.build();

        Self {
            schema,
            id,
            slug,
            title,
            description,
            tags,
            genre,
            author,
        }
    }

    /// Fields searched by a bare query term
    pub fn default_fields(&self) -> Vec<Field> {
        vec![
            self.title,
            self.description,
            self.tags,
            self.genre,
            self.author,
        ]
    }
}

impl Default for StorySchema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let schema = StorySchema::new();
        assert!(schema.schema.get_field("title").is_ok());
        assert!(schema.schema.get_field("tags").is_ok());
        assert!(schema.schema.get_field("author").is_ok());
        assert_eq!(schema.default_fields().len(), 5);
    }
}
