mod common;

use std::fs;
use std::path::Path;

use colograph::cli::{self, Args, Command};
use colograph::io::record::Mapping;
use common::{read_endpoints, read_lines, read_pairs};
use serde_json::Value;

fn execute(command: Command) -> anyhow::Result<()> {
    cli::run(Args {
        threads: 4,
        batch: 4 * 1024 * 1024,
        log_level: "info".into(),
        command,
    })
}

struct Corpus {
    vertex_docs: std::path::PathBuf,
    edge_docs: std::path::PathBuf,
    vertexes: std::path::PathBuf,
    endpoints: std::path::PathBuf,
    temp_a: std::path::PathBuf,
    temp_b: std::path::PathBuf,
    edges_int: std::path::PathBuf,
    weights: std::path::PathBuf,
    vertexes_out: std::path::PathBuf,
    edges_out: std::path::PathBuf,
}

impl Corpus {
    fn new(dir: &Path) -> Self {
        Self {
            vertex_docs: dir.join("documents.in"),
            edge_docs: dir.join("edges.in"),
            vertexes: dir.join("vertexes.txt"),
            endpoints: dir.join("endpoints.txt"),
            temp_a: dir.join("scratch.a"),
            temp_b: dir.join("scratch.b"),
            edges_int: dir.join("edges.i64"),
            weights: dir.join("weights.bin"),
            vertexes_out: dir.join("documents.out"),
            edges_out: dir.join("edges.out"),
        }
    }

    fn run_all(&self, batch: usize) -> anyhow::Result<()> {
        execute(Command::ExtractVertexes {
            input: self.vertex_docs.clone(),
            out: self.vertexes.clone(),
        })?;
        execute(Command::ExtractEdges {
            input: self.edge_docs.clone(),
            out: self.endpoints.clone(),
        })?;
        cli::run(Args {
            threads: 4,
            batch,
            log_level: "info".into(),
            command: Command::MapEdges {
                vertexes: self.vertexes.clone(),
                edges: self.endpoints.clone(),
                temp_a: self.temp_a.clone(),
                temp_b: self.temp_b.clone(),
                out: self.edges_int.clone(),
            },
        })?;
        execute(Command::Optimize {
            input: self.edges_int.clone(),
            out: self.weights.clone(),
        })?;
        execute(Command::Translate {
            map: self.weights.clone(),
            vertexes: self.vertex_docs.clone(),
            vertexes_out: self.vertexes_out.clone(),
            edges: self.edge_docs.clone(),
            edges_out: self.edges_out.clone(),
            edge_map: self.edges_int.clone(),
        })?;
        Ok(())
    }
}

fn parse(line: &str) -> serde_json::Map<String, Value> {
    serde_json::from_str(line).unwrap()
}

#[test]
fn three_vertex_corpus_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let c = Corpus::new(dir.path());

    fs::write(
        &c.vertex_docs,
        concat!(
            "{\"_id\":\"c/v000\",\"_key\":\"v000\"}\n",
            "{\"_id\":\"c/v001\",\"_key\":\"v001\"}\n",
            "{\"_id\":\"c/v002\",\"_key\":\"v002\"}\n",
        ),
    )?;
    fs::write(
        &c.edge_docs,
        concat!(
            "{\"_from\":\"c/v002\",\"_to\":\"c/v001\"}\n",
            "{\"_from\":\"c/v001\",\"_to\":\"c/v000\"}\n",
        ),
    )?;

    c.run_all(4 * 1024 * 1024)?;

    assert_eq!(read_lines(&c.vertexes), vec!["v000", "v001", "v002"]);
    assert_eq!(
        read_lines(&c.endpoints),
        vec!["v002", "v001", "v001", "v000"]
    );
    assert_eq!(read_endpoints(&c.edges_int), vec![2, 1, 1, 0]);
    assert_eq!(
        read_pairs(&c.weights),
        vec![
            Mapping { a: 0, b: 1 },
            Mapping { a: 0, b: 2 },
            Mapping { a: 0, b: -1 },
        ]
    );

    let vertexes = read_lines(&c.vertexes_out);
    let doc = parse(&vertexes[0]);
    assert_eq!(doc["_key"], "0:v000");
    assert_eq!(doc["smart"], "0");
    assert_eq!(doc["serial_number"], "v000");
    assert_eq!(parse(&vertexes[1])["_key"], "0:v001");
    assert_eq!(parse(&vertexes[2])["_key"], "0:v002");

    let edges = read_lines(&c.edges_out);
    let doc = parse(&edges[0]);
    assert_eq!(doc["_from"], "entities2/0:v002");
    assert_eq!(doc["_to"], "entities2/0:v001");

    Ok(())
}

#[test]
fn small_map_batches_reproduce_the_single_pass_pipeline() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut vertex_docs = String::new();
    for i in 0..100 {
        vertex_docs.push_str(&format!("{{\"_id\":\"c/v{i:03}\",\"_key\":\"v{i:03}\"}}\n"));
    }
    let mut edge_docs = String::new();
    for i in 0..80u64 {
        let from = (i * 3 + 11) % 100;
        let to = (i * 7) % 100;
        edge_docs.push_str(&format!(
            "{{\"_from\":\"c/v{from:03}\",\"_to\":\"c/v{to:03}\"}}\n"
        ));
    }

    let small = Corpus::new(&dir.path().join("small"));
    let big = Corpus::new(&dir.path().join("big"));
    for c in [&small, &big] {
        fs::create_dir_all(c.vertex_docs.parent().unwrap())?;
        fs::write(&c.vertex_docs, &vertex_docs)?;
        fs::write(&c.edge_docs, &edge_docs)?;
    }

    small.run_all(10)?;
    big.run_all(4 * 1024 * 1024)?;

    assert_eq!(fs::read(&small.edges_int)?, fs::read(&big.edges_int)?);
    assert_eq!(fs::read(&small.weights)?, fs::read(&big.weights)?);
    assert_eq!(fs::read(&small.vertexes_out)?, fs::read(&big.vertexes_out)?);
    assert_eq!(fs::read(&small.edges_out)?, fs::read(&big.edges_out)?);
    Ok(())
}

#[test]
fn forest_corpus_satisfies_the_weight_invariants() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let c = Corpus::new(dir.path());

    let vertex_count = 200i64;
    let mut vertex_docs = String::new();
    for i in 0..vertex_count {
        vertex_docs.push_str(&format!("{{\"_id\":\"c/v{i:04}\",\"_key\":\"v{i:04}\"}}\n"));
    }
    // Every vertex i > 0 hangs off a smaller one, so the graph is a single
    // tree and every target has exactly one claiming source.
    let mut edge_docs = String::new();
    for i in 1..vertex_count {
        let parent = (i * 31 + 17) % i;
        edge_docs.push_str(&format!(
            "{{\"_from\":\"c/v{parent:04}\",\"_to\":\"c/v{i:04}\"}}\n"
        ));
    }
    fs::write(&c.vertex_docs, &vertex_docs)?;
    fs::write(&c.edge_docs, &edge_docs)?;

    c.run_all(64)?;

    let endpoints = read_endpoints(&c.edges_int);
    let weights = read_pairs(&c.weights);
    assert_eq!(weights.len(), vertex_count as usize);

    for (i, w) in weights.iter().enumerate() {
        assert!(w.a <= i as i64, "w[{i}].a = {}", w.a);
        assert!(w.b == -1 || w.b != i as i64, "self-claim at {i}");
        assert_eq!(w.a, 0, "one tree, one weight");
    }
    for edge in endpoints.chunks_exact(2) {
        let (u, v) = (edge[0] as usize, edge[1] as usize);
        assert_eq!(weights[u].a, weights[v].a, "edge ({u}, {v})");
    }
    Ok(())
}

#[test]
fn malformed_document_fails_the_run_but_keeps_the_good_lines() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("documents.in");
    let output = dir.path().join("vertexes.txt");

    let mut body = String::new();
    for i in 0..10 {
        if i == 2 {
            body.push_str("this is not json\n");
        } else {
            body.push_str(&format!("{{\"_id\":\"c/v{i:03}\"}}\n"));
        }
    }
    fs::write(&input, body)?;

    let res = execute(Command::ExtractVertexes {
        input: input.clone(),
        out: output.clone(),
    });
    assert!(res.is_err());
    assert_eq!(read_lines(&output).len(), 9);
    Ok(())
}

#[test]
fn empty_corpus_runs_clean_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let c = Corpus::new(dir.path());
    fs::write(&c.vertex_docs, "")?;
    fs::write(&c.edge_docs, "")?;

    c.run_all(4 * 1024 * 1024)?;

    for path in [
        &c.vertexes,
        &c.endpoints,
        &c.edges_int,
        &c.weights,
        &c.vertexes_out,
        &c.edges_out,
    ] {
        assert_eq!(fs::metadata(path)?.len(), 0, "{}", path.display());
    }
    Ok(())
}
