/// SQL for the products table and its search indexes.
///
/// `title_search` is a generated tsvector backing the full-text endpoint; `embedding` holds the
/// sentence vector used by the semantic endpoint.
pub struct ProductSchema;

impl ProductSchema {
    pub fn create_vector_extension_sql() -> &'static str {
        "CREATE EXTENSION IF NOT EXISTS vector"
    }

    pub fn create_products_table_sql(dimension: usize) -> String {
        format!(
            "
            CREATE TABLE IF NOT EXISTS products (
                id BIGSERIAL PRIMARY KEY,
                product_id BIGINT NOT NULL,
                domain TEXT NOT NULL,
                title TEXT NOT NULL,
                raw_json JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                title_search TSVECTOR GENERATED ALWAYS AS (to_tsvector('english', coalesce(title, ''))) STORED,
                embedding vector({dimension}),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (domain, product_id)
            )
            "
        )
    }

    pub fn create_indexes_sql() -> Vec<&'static str> {
        vec![
            "CREATE INDEX IF NOT EXISTS idx_products_title_search ON products USING GIN (title_search)",
            "CREATE INDEX IF NOT EXISTS idx_products_domain ON products (domain)",
            "CREATE INDEX IF NOT EXISTS idx_products_embedding_hnsw ON products USING hnsw (embedding vector_cosine_ops)",
        ]
    }

    /// Every statement needed for a fresh database, in order
    pub fn statements(dimension: usize) -> Vec<String> {
        let mut statements = vec![
            Self::create_vector_extension_sql().to_string(),
            Self::create_products_table_sql(dimension),
        ];
        statements.extend(Self::create_indexes_sql().into_iter().map(str::to_string));
        statements
    }
}
