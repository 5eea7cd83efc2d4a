use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tailor_query::{BoostClause, BoostTarget, DocField, MatchClause, ScoringExpression};
use tantivy::collector::{Count, TopDocs};
use tantivy::doc;
use tantivy::query::{
    BooleanQuery, ConstScoreQuery, EmptyQuery, FuzzyTermQuery, Occur, Query, TermQuery,
};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, Value,
    STORED, STRING,
};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::{IndexDocument, IndexEngine, SearchHit, SearchPage};

const TOKENIZER: &str = "news";
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Field handles for fast access at query time.
#[derive(Debug, Clone)]
pub struct TantivyFields {
    pub id: Field,
    pub title: Field,
    pub body: Field,
    pub category: Field,
}

impl TantivyFields {
    fn field(&self, f: DocField) -> Field {
        match f {
            DocField::Title => self.title,
            DocField::Body => self.body,
            DocField::Category => self.category,
        }
    }
}

/// Default Tantivy-based index engine.
pub struct TantivyIndexEngine {
    pub schema: Schema,
    pub fields: TantivyFields,
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
}

impl TantivyIndexEngine {
    /// `id` and `category` are stored verbatim as keywords; `title` and `body`
    /// are analyzed with positions and frequencies for BM25.
    pub fn build_schema() -> (Schema, TantivyFields) {
        let text_indexing = TextFieldIndexing::default()
            .set_index_option(IndexRecordOption::WithFreqsAndPositions)
            .set_tokenizer(TOKENIZER);

        let text_with_positions = TextOptions::default()
            .set_indexing_options(text_indexing)
            .set_stored();

        let mut sb = SchemaBuilder::default();
        let id = sb.add_text_field("id", STRING | STORED);
        let title = sb.add_text_field("title", text_with_positions.clone());
        let body = sb.add_text_field("body", text_with_positions);
        let category = sb.add_text_field("category", STRING | STORED);
        let schema = sb.build();
        (
            schema,
            TantivyFields {
                id,
                title,
                body,
                category,
            },
        )
    }

    pub fn in_memory() -> Result<Self> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::from_index(index, schema, fields)
    }

    /// Open an existing index at `dir`, or create one if missing.
    pub fn open_or_create_in_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let (schema, fields) = Self::build_schema();
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating index dir {}", dir.display()))?;
        }
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).context("open tantivy index")?
        } else {
            Index::create_in_dir(dir, schema.clone()).context("create tantivy index")?
        };
        Self::from_index(index, schema, fields)
    }

    fn from_index(index: Index, schema: Schema, fields: TantivyFields) -> Result<Self> {
        register_tokenizer(&index);
        let reader = index.reader().context("build index reader")?;
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .context("create index writer")?;
        Ok(Self {
            schema,
            fields,
            index,
            reader,
            writer: Mutex::new(writer),
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Translate the expression tree into a tantivy query.
    pub fn compile(&self, expr: &ScoringExpression) -> Box<dyn Query> {
        match expr {
            ScoringExpression::Base(base) => self.compile_match(base),
            ScoringExpression::Composite { base, boosts, .. } => {
                // Sum is the only combination mode: a Must base plus optional
                // Should boosts scores as base + Σ matching boost weights.
                let mut clauses: Vec<(Occur, Box<dyn Query>)> =
                    Vec::with_capacity(boosts.len() + 1);
                clauses.push((Occur::Must, self.compile_match(base)));
                for boost in boosts {
                    clauses.push((Occur::Should, self.compile_boost(boost)));
                }
                Box::new(BooleanQuery::new(clauses))
            }
            ScoringExpression::AnyCategory(categories) => {
                let clauses: Vec<(Occur, Box<dyn Query>)> = categories
                    .iter()
                    .map(|c| {
                        let q: Box<dyn Query> = Box::new(ConstScoreQuery::new(
                            Box::new(self.category_term(c)),
                            1.0,
                        ));
                        (Occur::Should, q)
                    })
                    .collect();
                if clauses.is_empty() {
                    return Box::new(EmptyQuery);
                }
                Box::new(BooleanQuery::new(clauses))
            }
        }
    }

    fn compile_match(&self, m: &MatchClause) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for &f in &m.fields {
            let field = self.fields.field(f);
            if f == DocField::Category {
                // Keyword field: the whole query is one term.
                let raw = m.query.trim();
                if !raw.is_empty() {
                    let distance = m.fuzziness.distance_for(raw);
                    clauses.push((
                        Occur::Should,
                        fuzzy_or_exact(Term::from_field_text(field, raw), distance, IndexRecordOption::Basic),
                    ));
                }
                continue;
            }
            for token in analyze_terms(&m.query) {
                let distance = m.fuzziness.distance_for(&token);
                clauses.push((
                    Occur::Should,
                    fuzzy_or_exact(
                        Term::from_field_text(field, &token),
                        distance,
                        IndexRecordOption::WithFreqs,
                    ),
                ));
            }
        }
        if clauses.is_empty() {
            return Box::new(EmptyQuery);
        }
        Box::new(BooleanQuery::new(clauses))
    }

    fn compile_boost(&self, boost: &BoostClause) -> Box<dyn Query> {
        let filter: Box<dyn Query> = match &boost.target {
            BoostTarget::CategoryEquals(category) => Box::new(self.category_term(category)),
            BoostTarget::TermIn { term, fields } => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for &f in fields {
                    let field = self.fields.field(f);
                    if f == DocField::Category {
                        clauses.push((Occur::Should, Box::new(self.category_term(term))));
                        continue;
                    }
                    for token in analyze_terms(term) {
                        clauses.push((
                            Occur::Should,
                            Box::new(TermQuery::new(
                                Term::from_field_text(field, &token),
                                IndexRecordOption::Basic,
                            )),
                        ));
                    }
                }
                if clauses.is_empty() {
                    Box::new(EmptyQuery)
                } else {
                    Box::new(BooleanQuery::new(clauses))
                }
            }
        };
        Box::new(ConstScoreQuery::new(filter, boost.weight as f32))
    }

    fn category_term(&self, category: &str) -> TermQuery {
        TermQuery::new(
            Term::from_field_text(self.fields.category, category),
            IndexRecordOption::Basic,
        )
    }

    fn to_hit(&self, doc: &TantivyDocument, score: f32) -> SearchHit {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        SearchHit {
            id: text(self.fields.id),
            title: text(self.fields.title),
            body: text(self.fields.body),
            category: text(self.fields.category),
            score,
        }
    }
}

impl IndexEngine for TantivyIndexEngine {
    fn engine_name(&self) -> &'static str {
        "tantivy"
    }

    fn add(&self, doc: IndexDocument) -> Result<()> {
        let tdoc = doc!(
            self.fields.id => doc.id.clone(),
            self.fields.title => doc.title,
            self.fields.body => doc.body,
            self.fields.category => doc.category
        );
        let writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("index writer lock poisoned"))?;
        writer.delete_term(Term::from_field_text(self.fields.id, &doc.id));
        writer.add_document(tdoc).context("add document")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("index writer lock poisoned"))?;
        writer.commit().context("writer commit")?;
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        self.reader.reload().context("reader reload")?;
        Ok(())
    }

    fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn search(&self, expr: &ScoringExpression, offset: usize, limit: usize) -> Result<SearchPage> {
        let query = self.compile(expr);
        let searcher = self.reader.searcher();
        // The collector preallocates offset + limit slots, so the window
        // must never reach past the documents that exist.
        let num_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        if limit == 0 || offset >= num_docs {
            let total = searcher.search(&query, &Count)?;
            return Ok(SearchPage {
                hits: Vec::new(),
                total: total as u64,
            });
        }
        let limit = limit.min(num_docs - offset);
        let (total, top_docs) = searcher.search(
            &query,
            &(Count, TopDocs::with_limit(limit).and_offset(offset)),
        )?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc = searcher.doc::<TantivyDocument>(addr)?;
            hits.push(self.to_hit(&doc, score));
        }
        Ok(SearchPage {
            hits,
            total: total as u64,
        })
    }
}

fn fuzzy_or_exact(term: Term, distance: u8, record: IndexRecordOption) -> Box<dyn Query> {
    let exact: Box<dyn Query> = Box::new(TermQuery::new(term.clone(), record));
    if distance == 0 {
        return exact;
    }
    // Exact hits keep their BM25 score; the fuzzy arm adds recall for typos.
    Box::new(BooleanQuery::new(vec![
        (Occur::Should, exact),
        (
            Occur::Should,
            Box::new(FuzzyTermQuery::new(term, distance, true)),
        ),
    ]))
}

/// Mirror of the `news` analyzer: split on non-alphanumerics, lowercase.
pub fn analyze_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn register_tokenizer(index: &Index) {
    use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER, analyzer);
}
