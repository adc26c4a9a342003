//! Graph state checkpointing.
//!
//! A checkpoint is a directory `chkpt-<iter>` holding one edge file per
//! edge partition (`term \t doc \t z,z,...` rows). Files are written
//! into a temporary sibling directory and published with an atomic
//! rename, and a `LATEST` marker (also rename-published) names the last
//! complete checkpoint, so a crash mid-write never corrupts the
//! restartable state.

use crate::common_io::{open_buf_reader, open_buf_writer, read_lines};
use crate::config::LdaConfig;
use crate::counter_update::update_counters;
use crate::input::CorpusGraph;
use anyhow::{bail, Context, Result};
use log::info;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use token_graph::{EdgePartition, TokenEdge, VertexStore};

/// Write a checkpoint for the current graph state. Returns the
/// published directory.
pub fn save_checkpoint(graph: &CorpusGraph, dir: &Path, iter: usize) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(".tmp-chkpt-{}", iter));
    let fin = dir.join(format!("chkpt-{}", iter));
    if tmp.exists() {
        std::fs::remove_dir_all(&tmp)?;
    }
    std::fs::create_dir_all(&tmp)?;

    for (pid, part) in graph.edge_parts.iter().enumerate() {
        let path = tmp.join(format!("edges-{:05}.tsv.gz", pid));
        let mut w = open_buf_writer(&path)?;
        for (e, occ) in part.data.iter().enumerate() {
            let t = part.local_to_global[part.local_src_ids[e] as usize];
            let d = part.local_to_global[part.local_dst_ids[e] as usize];
            let topics: Vec<String> = occ.iter().map(|z| z.to_string()).collect();
            writeln!(w, "{}\t{}\t{}", t, d, topics.join(","))?;
        }
        w.flush()?;
    }

    if fin.exists() {
        std::fs::remove_dir_all(&fin)?;
    }
    std::fs::rename(&tmp, &fin)
        .with_context(|| format!("cannot publish checkpoint {}", fin.display()))?;

    // LATEST is itself rename-published
    let marker_tmp = dir.join(".LATEST.tmp");
    std::fs::write(&marker_tmp, format!("chkpt-{}\n", iter))?;
    std::fs::rename(&marker_tmp, dir.join("LATEST"))?;

    info!("checkpoint {} written", fin.display());
    Ok(fin)
}

/// Load the most recent complete checkpoint from `dir`.
pub fn load_checkpoint(dir: &Path, cfg: &LdaConfig) -> Result<CorpusGraph> {
    let marker = read_lines(&dir.join("LATEST"))
        .with_context(|| format!("no LATEST marker in {}", dir.display()))?;
    let name = marker
        .first()
        .with_context(|| "empty LATEST marker")?
        .trim()
        .to_string();
    let chkpt = dir.join(&name);

    let mut edge_parts = Vec::new();
    let mut num_tokens = 0u64;
    let mut files: Vec<PathBuf> = std::fs::read_dir(&chkpt)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("edges-"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    if files.is_empty() {
        bail!("checkpoint {} has no edge files", chkpt.display());
    }

    for path in files {
        let mut edges = Vec::new();
        let reader = open_buf_reader(&path)?;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split('\t');
            let ctx = || format!("{}:{}", path.display(), lineno + 1);
            let term: u64 = fields
                .next()
                .with_context(ctx)?
                .parse()
                .with_context(ctx)?;
            let doc: u64 = fields.next().with_context(ctx)?.parse().with_context(ctx)?;
            let topics: Vec<u32> = fields
                .next()
                .with_context(ctx)?
                .split(',')
                .map(|z| z.parse::<u32>().with_context(ctx))
                .collect::<Result<_>>()?;
            for &z in &topics {
                if z as usize >= cfg.num_topics {
                    bail!("{}: topic {} outside [0, {})", ctx(), z, cfg.num_topics);
                }
            }
            num_tokens += topics.len() as u64;
            edges.push(TokenEdge {
                term,
                doc,
                topics: topics.into_boxed_slice(),
            });
        }
        edge_parts.push(EdgePartition::from_edges(edges));
    }

    let mut store = VertexStore::new(edge_parts.len());
    for part in &edge_parts {
        for &vid in &part.local_to_global {
            store.register(vid);
        }
    }
    let num_terms = store
        .partitions
        .iter()
        .flat_map(|vp| vp.ids.iter())
        .filter(|&&v| token_graph::ids::is_term_id(v))
        .count();
    let num_docs = store.num_vertices() - num_terms;

    let mut graph = CorpusGraph {
        edge_parts,
        store,
        num_tokens,
        num_terms,
        num_docs,
        vocab: None,
    };
    update_counters(&mut graph.edge_parts, &mut graph.store, cfg.num_topics);

    info!(
        "restored {} ({} tokens, {} terms, {} docs)",
        chkpt.display(),
        graph.num_tokens,
        graph.num_terms,
        graph.num_docs
    );
    Ok(graph)
}
