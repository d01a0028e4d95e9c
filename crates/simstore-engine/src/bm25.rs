use std::collections::HashMap;

/// BM25 parameters.
const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Tokenize text into lowercase words, filtering tokens with length <= 1.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1)
        .collect()
}

/// A BM25 inverted index over record raw text.
///
/// Kept in lockstep with the record store so corpus statistics (document
/// count, average length, document frequency) describe exactly the live
/// records.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    /// term -> (doc_id -> term_frequency)
    inverted_index: HashMap<String, HashMap<String, f64>>,
    /// doc_id -> document length (token count)
    doc_lengths: HashMap<String, f64>,
    /// Sum of all document lengths.
    total_length: f64,
}

/// A query pre-processed against one index state.
///
/// Holds the per-term IDF and the largest score any document could reach,
/// which is what normalizes [`Bm25Index::normalized_score`] into [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalQuery {
    terms: Vec<(String, f64)>,
    max_score: f64,
}

impl LexicalQuery {
    /// Whether no query term appears in the corpus.
    pub fn is_empty(&self) -> bool {
        self.max_score <= 0.0
    }
}

impl Bm25Index {
    /// Create a new, empty BM25 index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Re-adding an existing id replaces it.
    pub fn add_document(&mut self, id: &str, text: &str) {
        self.remove_document(id);

        let tokens = tokenize(text);
        let doc_len = tokens.len() as f64;

        let mut term_freq: HashMap<String, f64> = HashMap::new();
        for token in tokens {
            *term_freq.entry(token).or_insert(0.0) += 1.0;
        }
        for (term, freq) in term_freq {
            self.inverted_index
                .entry(term)
                .or_default()
                .insert(id.to_string(), freq);
        }

        self.doc_lengths.insert(id.to_string(), doc_len);
        self.total_length += doc_len;
    }

    /// Remove a document from every posting list.
    pub fn remove_document(&mut self, id: &str) {
        let Some(len) = self.doc_lengths.remove(id) else {
            return;
        };
        self.total_length -= len;

        self.inverted_index.retain(|_, postings| {
            postings.remove(id);
            !postings.is_empty()
        });
    }

    /// Number of indexed documents.
    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    fn avg_doc_length(&self) -> f64 {
        match self.doc_lengths.len() {
            0 => 1.0,
            n => (self.total_length / n as f64).max(f64::MIN_POSITIVE),
        }
    }

    /// Resolve query terms to IDF weights.
    ///
    /// Repeated query terms count once. `IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)`
    /// (Robertson, always positive). Each term contributes at most
    /// `IDF(t) * (k1 + 1)` to a document's score, and the sum of those bounds
    /// is the normalizer.
    pub fn prepare(&self, query: &str) -> LexicalQuery {
        let n = self.doc_lengths.len() as f64;
        let mut seen = std::collections::HashSet::new();
        let mut terms = Vec::new();
        let mut max_score = 0.0;

        for token in tokenize(query) {
            if !seen.insert(token.clone()) {
                continue;
            }
            if let Some(postings) = self.inverted_index.get(&token) {
                let df = postings.len() as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                max_score += idf * (K1 + 1.0);
                terms.push((token, idf));
            }
        }

        LexicalQuery { terms, max_score }
    }

    /// Raw BM25 score of one document.
    ///
    /// ```text
    /// score = sum over query terms of
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// ```
    pub fn score(&self, query: &LexicalQuery, id: &str) -> f64 {
        let Some(&dl) = self.doc_lengths.get(id) else {
            return 0.0;
        };
        let avgdl = self.avg_doc_length();

        query
            .terms
            .iter()
            .filter_map(|(term, idf)| {
                let tf = *self.inverted_index.get(term)?.get(id)?;
                let denominator = tf + K1 * (1.0 - B + B * dl / avgdl);
                Some(idf * tf * (K1 + 1.0) / denominator)
            })
            .sum()
    }

    /// BM25 score scaled into [0, 1] by the query's attainable maximum.
    ///
    /// Depends only on the query, the document and corpus statistics, never
    /// on which other documents are being scored.
    pub fn normalized_score(&self, query: &LexicalQuery, id: &str) -> f64 {
        if query.is_empty() {
            return 0.0;
        }
        (self.score(query, id) / query.max_score).clamp(0.0, 1.0)
    }
}
