//! Model artifact writers.
//!
//! Two artifacts: the term–topic matrix and the doc–topic counts, as
//! gzipped TSV with sparse `topic:count` rows. Either one file per
//! vertex partition or a single coalesced ("solid") file, and the term
//! matrix optionally transposed to topic-major rows.

use crate::common_io::open_buf_writer;
use crate::input::CorpusGraph;
use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};
use token_graph::{ids, TopicCount, VertexId};

/// Where and how to write the model.
#[derive(Debug, Clone)]
pub struct ModelSink {
    /// Output directory, created by the writer
    pub out_dir: PathBuf,
    /// Write the term matrix topic-major
    pub transposed: bool,
    /// Coalesce into one file per artifact instead of one per partition
    pub solid: bool,
}

/// Write both artifacts (and the vocabulary, when the corpus carried
/// one) under the sink directory.
pub fn save_model(graph: &CorpusGraph, sink: &ModelSink, num_topics: usize) -> Result<()> {
    std::fs::create_dir_all(&sink.out_dir)
        .with_context(|| format!("cannot create {}", sink.out_dir.display()))?;

    write_artifact(graph, sink, num_topics, Artifact::TermTopic)?;
    write_artifact(graph, sink, num_topics, Artifact::DocTopic)?;

    if let Some(vocab) = &graph.vocab {
        let path = sink.out_dir.join("vocab.tsv.gz");
        let mut w = open_buf_writer(&path)?;
        for (i, word) in vocab.iter().enumerate() {
            writeln!(w, "{}\t{}", i, word)?;
        }
        w.flush()?;
    }

    info!("model saved to {}", sink.out_dir.display());
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Artifact {
    TermTopic,
    DocTopic,
}

impl Artifact {
    fn stem(&self) -> &'static str {
        match self {
            Artifact::TermTopic => "term_topic",
            Artifact::DocTopic => "doc_topic",
        }
    }

    fn wants(&self, vid: VertexId) -> bool {
        match self {
            Artifact::TermTopic => ids::is_term_id(vid),
            Artifact::DocTopic => ids::is_doc_id(vid),
        }
    }
}

fn write_artifact(
    graph: &CorpusGraph,
    sink: &ModelSink,
    num_topics: usize,
    artifact: Artifact,
) -> Result<()> {
    let transposed = sink.transposed && artifact == Artifact::TermTopic;

    if transposed {
        // Topic-major needs the whole matrix in one pass
        let mut rows: Vec<Vec<(u64, u32)>> = vec![Vec::new(); num_topics];
        for vp in &graph.store.partitions {
            for (vid, tc) in vp.ids.iter().zip(vp.values.iter()) {
                if artifact.wants(*vid) {
                    let idx = ids::index_of(*vid);
                    tc.for_each_nonzero(|t, c| rows[t as usize].push((idx, c)));
                }
            }
        }
        let path = sink.out_dir.join(format!("{}.tsv.gz", artifact.stem()));
        let mut w = open_buf_writer(&path)?;
        for (topic, mut row) in rows.into_iter().enumerate() {
            row.sort_unstable_by_key(|&(idx, _)| idx);
            write!(w, "{}", topic)?;
            for (idx, c) in row {
                write!(w, "\t{}:{}", idx, c)?;
            }
            writeln!(w)?;
        }
        w.flush()?;
        return Ok(());
    }

    let write_rows = |w: &mut dyn Write, ids_: &[VertexId], values: &[TopicCount]| -> Result<()> {
        let mut rows: Vec<(u64, &TopicCount)> = ids_
            .iter()
            .zip(values.iter())
            .filter(|(vid, _)| artifact.wants(**vid))
            .map(|(vid, tc)| (ids::index_of(*vid), tc))
            .collect();
        rows.sort_unstable_by_key(|&(idx, _)| idx);
        let mut pairs: Vec<(u32, u32)> = Vec::new();
        for (idx, tc) in rows {
            pairs.clear();
            tc.for_each_nonzero(|t, c| pairs.push((t, c)));
            write!(w, "{}", idx)?;
            for &(t, c) in &pairs {
                write!(w, "\t{}:{}", t, c)?;
            }
            writeln!(w)?;
        }
        Ok(())
    };

    if sink.solid {
        let path = sink.out_dir.join(format!("{}.tsv.gz", artifact.stem()));
        let mut w = open_buf_writer(&path)?;
        for vp in &graph.store.partitions {
            write_rows(&mut *w, &vp.ids, &vp.values)?;
        }
        w.flush()?;
    } else {
        for (i, vp) in graph.store.partitions.iter().enumerate() {
            let path = sink
                .out_dir
                .join(format!("{}.part-{:05}.tsv.gz", artifact.stem(), i));
            let mut w = open_buf_writer(&path)?;
            write_rows(&mut *w, &vp.ids, &vp.values)?;
            w.flush()?;
        }
    }
    Ok(())
}
