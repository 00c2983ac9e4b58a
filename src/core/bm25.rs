//! Sparse keyword model for the BM25 half of hybrid search.
//!
//! The model learns a vocabulary, per-term IDF and average document length
//! from a corpus, then turns arbitrary text into sparse index/value vectors.
//! State is JSON-serialisable and the round-trip is bit-exact for `idf`,
//! `avg_doc_length` and ordering.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::core::error::{Error, Result};

pub const DEFAULT_K1: f32 = 1.2;
pub const DEFAULT_B: f32 = 0.75;
pub const DEFAULT_MIN_TERM_LEN: usize = 2;

/// Parallel index/value arrays. Indices are strictly increasing and all
/// below the vocabulary size; empty means no vocabulary term matched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Dot product against another sparse vector (both index-sorted).
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut score = 0.0;
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    score += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        score
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub max_terms: Option<usize>,
    pub min_score: Option<f32>,
    pub normalize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Bm25State", into = "Bm25State")]
pub struct Bm25Model {
    k1: f32,
    b: f32,
    min_term_len: usize,
    stop_words: BTreeSet<String>,
    vocabulary: HashMap<String, u32>,
    idf: HashMap<String, f32>,
    avg_doc_length: f32,
    trained: bool,
}

/// JSON layout: vocabulary and idf as pair lists with a fixed ordering.
#[derive(Serialize, Deserialize)]
struct Bm25State {
    vocabulary: Vec<(String, u32)>,
    idf: Vec<(String, f32)>,
    avg_doc_length: f32,
    k1: f32,
    b: f32,
    min_term_len: usize,
    stop_words: BTreeSet<String>,
    trained: bool,
}

impl From<Bm25Model> for Bm25State {
    fn from(model: Bm25Model) -> Self {
        let mut vocabulary: Vec<(String, u32)> =
            model.vocabulary.into_iter().collect();
        vocabulary.sort_by_key(|(_, index)| *index);
        let mut idf: Vec<(String, f32)> = model.idf.into_iter().collect();
        idf.sort_by(|(a, _), (b, _)| a.cmp(b));
        Self {
            vocabulary,
            idf,
            avg_doc_length: model.avg_doc_length,
            k1: model.k1,
            b: model.b,
            min_term_len: model.min_term_len,
            stop_words: model.stop_words,
            trained: model.trained,
        }
    }
}

impl From<Bm25State> for Bm25Model {
    fn from(state: Bm25State) -> Self {
        Self {
            k1: state.k1,
            b: state.b,
            min_term_len: state.min_term_len,
            stop_words: state.stop_words,
            vocabulary: state.vocabulary.into_iter().collect(),
            idf: state.idf.into_iter().collect(),
            avg_doc_length: state.avg_doc_length,
            trained: state.trained,
        }
    }
}

impl Default for Bm25Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Model {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B, DEFAULT_MIN_TERM_LEN, BTreeSet::new())
    }

    pub fn with_params(
        k1: f32,
        b: f32,
        min_term_len: usize,
        stop_words: BTreeSet<String>,
    ) -> Self {
        Self {
            k1,
            b,
            min_term_len,
            stop_words,
            vocabulary: HashMap::new(),
            idf: HashMap::new(),
            avg_doc_length: 0.0,
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn avg_doc_length(&self) -> f32 {
        self.avg_doc_length
    }

    /// Rebuild the model from scratch over `corpus`.
    pub fn learn<I, S>(&mut self, corpus: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_tokens = 0usize;
        let mut doc_count = 0usize;

        for doc in corpus {
            let tokens = self.tokenize(doc.as_ref());
            doc_count += 1;
            total_tokens += tokens.len();

            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for token in &tokens {
                seen.insert(token);
            }
            for term in seen {
                *doc_freq.entry(term.to_string()).or_insert(0) += 1;
            }
        }

        if doc_count == 0 {
            return Err(Error::EmptyCorpus);
        }

        self.vocabulary.clear();
        self.idf.clear();

        // Lexicographic index assignment keeps vocabularies deterministic
        // regardless of document order.
        let mut terms: Vec<(String, u32)> = doc_freq.into_iter().collect();
        terms.sort_by(|(a, _), (b, _)| a.cmp(b));

        let n = doc_count as f32;
        for (index, (term, df)) in terms.into_iter().enumerate() {
            let df = df as f32;
            // IDF may go negative for very common terms; that is intentional.
            let idf = ((n - df + 0.5) / (df + 0.5)).ln();
            self.vocabulary.insert(term.clone(), index as u32);
            self.idf.insert(term, idf);
        }

        self.avg_doc_length = total_tokens as f32 / doc_count as f32;
        self.trained = !self.vocabulary.is_empty() && self.avg_doc_length > 0.0;

        // A corpus whose every token was filtered out is as good as empty.
        if !self.trained {
            return Err(Error::EmptyCorpus);
        }
        Ok(())
    }

    /// Sparse BM25 vector for `text`.
    pub fn generate(&self, text: &str, options: GenerateOptions) -> Result<SparseVector> {
        if !self.trained {
            return Err(Error::NotTrained);
        }

        let tokens = self.tokenize(text);
        let doc_len = tokens.len() as f32;

        let mut term_freq: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let mut scored: Vec<(u32, f32)> = Vec::new();
        for (term, tf) in term_freq {
            let Some(&index) = self.vocabulary.get(term) else {
                continue;
            };
            let idf = self.idf[term];
            let numerator = tf * (self.k1 + 1.0);
            let denominator =
                tf + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_length);
            let score = idf * numerator / denominator;

            if let Some(min_score) = options.min_score {
                if score < min_score {
                    continue;
                }
            }
            scored.push((index, score));
        }

        if let Some(max_terms) = options.max_terms {
            // Highest score first; ties go to the lower vocabulary index.
            scored.sort_by(|(ia, sa), (ib, sb)| {
                sb.partial_cmp(sa)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ia.cmp(ib))
            });
            scored.truncate(max_terms);
        }

        scored.sort_by_key(|(index, _)| *index);

        let mut vector = SparseVector {
            indices: scored.iter().map(|(index, _)| *index).collect(),
            values: scored.iter().map(|(_, score)| *score).collect(),
        };

        if options.normalize {
            let norm: f32 = vector.values.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for value in &mut vector.values {
                    *value /= norm;
                }
            }
        }

        Ok(vector)
    }

    /// Lower-case, strip everything outside `[A-Za-z0-9_]`, split on
    /// whitespace, drop short tokens and stop words.
    fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        cleaned
            .split_whitespace()
            .filter(|token| token.len() >= self.min_term_len)
            .filter(|token| !self.stop_words.contains(*token))
            .map(|token| token.to_string())
            .collect()
    }
}

/// Per-collection persistence for the sparse model. The model is created
/// with a hybrid collection, rewritten after every re-training and
/// destroyed with the collection.
#[derive(Clone)]
pub struct Bm25Catalog {
    dir: std::path::PathBuf,
}

impl Bm25Catalog {
    pub fn new(dir: std::path::PathBuf) -> Self {
        Self { dir }
    }

    fn model_path(&self, collection: &str) -> std::path::PathBuf {
        self.dir.join(format!("{collection}.bm25.json"))
    }

    pub fn load(&self, collection: &str) -> Result<Option<Bm25Model>> {
        let path = self.model_path(collection);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, collection: &str, model: &Bm25Model) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.model_path(collection);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(model)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn delete(&self, collection: &str) -> Result<()> {
        match std::fs::remove_file(self.model_path(collection)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
