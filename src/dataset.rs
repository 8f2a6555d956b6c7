//! Document sources and static partitioning.
//!
//! A [`DocumentSource`] is the read-only view of the corpus the run starts
//! from. Each rank carves its [`Partition`] out of the source once at
//! startup and never touches the source again.

use crate::error::{ClusterError, Result};
use crate::group::Rank;
use crate::types::DocumentId;
use crate::vector::{Document, TermVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

/// Read-only provider of TF-IDF document vectors.
pub trait DocumentSource {
    /// Number of distinct documents.
    fn len(&self) -> usize;

    /// True when the source holds no documents.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All document ids, in the order used to partition the dataset.
    fn document_ids(&self) -> Vec<DocumentId>;

    /// The vector of one document.
    ///
    /// # Errors
    /// Returns [`ClusterError::DocumentNotFound`] for an unknown id.
    fn vector(&self, id: &DocumentId) -> Result<TermVector>;
}

/// An in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    index: HashMap<DocumentId, usize>,
}

impl Corpus {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, replacing any previous document with the same id
    /// while keeping its original position.
    pub fn push(&mut self, document: Document) {
        match self.index.get(&document.id) {
            Some(&pos) => self.documents[pos] = document,
            None => {
                self.index.insert(document.id.clone(), self.documents.len());
                self.documents.push(document);
            }
        }
    }

    /// Borrow the documents in order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Parse rows of `track_id<TAB>word<TAB>tfidf`.
    ///
    /// Rows of one track need not be adjacent; tracks are ordered by first
    /// appearance. Blank lines and lines starting with `#` are skipped.
    ///
    /// # Errors
    /// Returns [`ClusterError::InvalidFormat`] naming the offending line.
    pub fn from_tsv<R: BufRead>(reader: R) -> Result<Self> {
        let mut corpus = Corpus::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t');
            let (track, word, score) = match (fields.next(), fields.next(), fields.next()) {
                (Some(t), Some(w), Some(s)) if fields.next().is_none() => (t, w, s),
                _ => {
                    return Err(ClusterError::invalid_format(format!(
                        "line {}: expected 3 tab-separated fields",
                        lineno + 1
                    )))
                }
            };
            let weight: f64 = score.trim().parse().map_err(|_| {
                ClusterError::invalid_format(format!("line {}: bad weight {:?}", lineno + 1, score))
            })?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(ClusterError::invalid_format(format!(
                    "line {}: weight must be finite and non-negative",
                    lineno + 1
                )));
            }

            let id = DocumentId::new(track);
            let pos = match corpus.index.get(&id) {
                Some(&pos) => pos,
                None => {
                    corpus.push(Document::new(id, TermVector::new()));
                    corpus.documents.len() - 1
                }
            };
            corpus.documents[pos].vector.insert(word, weight);
        }

        Ok(corpus)
    }

    /// Load a TSV file, see [`Corpus::from_tsv`].
    pub fn load_tsv(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_tsv(BufReader::new(File::open(path)?))
    }

    /// Generate a random corpus.
    ///
    /// Each document draws `terms_per_doc` terms from a vocabulary of
    /// `vocabulary` words (`w0`, `w1`, ...) with weights in `(0, 1]`.
    pub fn generate(num_docs: usize, vocabulary: usize, terms_per_doc: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vocabulary = vocabulary.max(1);
        let mut corpus = Corpus::new();

        for i in 0..num_docs {
            let vector: TermVector = (0..terms_per_doc)
                .map(|_| {
                    let term = format!("w{}", rng.gen_range(0..vocabulary));
                    (term, 1.0 - rng.gen::<f64>())
                })
                .collect();
            corpus.push(Document::new(format!("TR{:08}", i), vector));
        }
        corpus
    }
}

impl FromIterator<Document> for Corpus {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        let mut corpus = Corpus::new();
        for document in iter {
            corpus.push(document);
        }
        corpus
    }
}

impl DocumentSource for Corpus {
    fn len(&self) -> usize {
        self.documents.len()
    }

    fn document_ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|d| d.id.clone()).collect()
    }

    fn vector(&self, id: &DocumentId) -> Result<TermVector> {
        self.index
            .get(id)
            .map(|&pos| self.documents[pos].vector.clone())
            .ok_or_else(|| ClusterError::DocumentNotFound(id.clone()))
    }
}

/// Index range of the documents owned by `rank`.
///
/// Ranks take contiguous chunks of `ceil(total / size)` documents in rank
/// order; trailing ranks may get a short or empty chunk.
pub fn partition_range(total: usize, size: usize, rank: Rank) -> Range<usize> {
    if size == 0 {
        return 0..0;
    }
    let chunk = total.div_ceil(size);
    let start = (rank * chunk).min(total);
    let end = (start + chunk).min(total);
    start..end
}

/// The documents one rank owns for the whole run.
#[derive(Debug, Clone)]
pub struct Partition {
    rank: Rank,
    range: Range<usize>,
    documents: Vec<Document>,
}

impl Partition {
    /// Build `rank`'s partition from the source.
    ///
    /// # Errors
    /// Fails if the source cannot produce a listed document.
    pub fn build<S: DocumentSource + ?Sized>(source: &S, rank: Rank, size: usize) -> Result<Self> {
        let ids = source.document_ids();
        let range = partition_range(ids.len(), size, rank);
        let documents = ids[range.clone()]
            .iter()
            .map(|id| Ok(Document::new(id.clone(), source.vector(id)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rank,
            range,
            documents,
        })
    }

    /// Wrap documents that are already in memory.
    pub fn from_documents(rank: Rank, documents: Vec<Document>) -> Self {
        let range = 0..documents.len();
        Self {
            rank,
            range,
            documents,
        }
    }

    /// Rank owning this partition.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Global index range covered.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The cached documents.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when this rank owns nothing.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Total number of stored terms, for status messages.
    pub fn term_count(&self) -> usize {
        self.documents.iter().map(|d| d.vector.nnz()).sum()
    }
}
