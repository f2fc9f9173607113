/// Sampler integration: chunked JSONL in, representative JSONL and report out
use articlecraft::embedding::HashingProvider;
use articlecraft::sampler::{
    RepresentativeSampler, SampledArticle, SamplerSettings, SamplingReport, REPORT_FILE,
    SAMPLES_FILE,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn write_corpus(path: &std::path::Path, rows: usize) {
    let topics = [
        "football match goal league season",
        "election vote parliament policy minister",
        "recipe oven flour sugar baking",
        "planet telescope orbit galaxy star",
    ];
    let mut file = std::fs::File::create(path).unwrap();
    for i in 0..rows {
        let text = format!("{} report number {} {}", topics[i % 4], i, "detail ".repeat(i % 7));
        let record = serde_json::json!({ "title": format!("Story {}", i), "text": text });
        writeln!(file, "{}", record).unwrap();
    }
    // A row with nothing left after normalization
    writeln!(file, r#"{{"title":"Empty","text":"!!!"}}"#).unwrap();
}

#[test]
fn test_sample_file_writes_bounded_selection() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("corpus.jsonl");
    let output = temp.path().join("samples");
    write_corpus(&input, 40);

    let settings = SamplerSettings {
        chunk_size: 15,
        batch_size: 8,
        n_clusters: 4,
        n_per_cluster: 2,
        seed: 42,
        max_iter: 30,
    };
    let sampler =
        RepresentativeSampler::new(settings, Arc::new(HashingProvider::new(48).unwrap())).unwrap();
    let report = sampler.sample_file(&input, &output).unwrap();

    assert_eq!(report.rows_seen, 41);
    assert_eq!(report.chunk_stats.len(), 3);
    assert_eq!(
        report.chunk_stats.iter().map(|c| c.dropped_empty).sum::<usize>(),
        1
    );

    let samples: Vec<SampledArticle> = std::fs::read_to_string(output.join(SAMPLES_FILE))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(samples.len(), report.rows_kept);
    assert!(samples.len() <= 3 * 4 * 2);
    for chunk in &report.chunk_stats {
        assert!(chunk.kept <= chunk.clusters * 2);
    }
    assert!(samples.iter().all(|s| s.title != "Empty"));

    let persisted: SamplingReport =
        serde_json::from_str(&std::fs::read_to_string(output.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(persisted.rows_kept, report.rows_kept);
}

#[test]
fn test_pinned_seed_gives_identical_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("corpus.jsonl");
    write_corpus(&input, 30);

    let run = |dir: &str| {
        let sampler = RepresentativeSampler::new(
            SamplerSettings {
                chunk_size: 30,
                n_clusters: 3,
                n_per_cluster: 3,
                ..Default::default()
            },
            Arc::new(HashingProvider::new(32).unwrap()),
        )
        .unwrap();
        let output = temp.path().join(dir);
        sampler.sample_file(&input, &output).unwrap();
        std::fs::read_to_string(output.join(SAMPLES_FILE)).unwrap()
    };

    assert_eq!(run("first"), run("second"));
}
