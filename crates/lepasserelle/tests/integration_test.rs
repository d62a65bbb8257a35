// Integration Tests for LePasserelle
//
// These tests cover end-to-end workflows:
// - CLI parsing of the index and search commands
// - Indexing a corpus and writing a run file with SQLite
// - Tokenizing topics for pretokenized runs
// - Configuration errors stopping a search

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// ============================================================================
// CLI WORKFLOW INTEGRATION TESTS
// ============================================================================

mod cli_workflow_tests {
    use super::*;
    use clap::Parser;
    use lepasserelle::cli::{
        cmd_index_impl, cmd_search_impl, cmd_tokenize_impl, Cli, Commands, IndexArgs, SearchArgs,
    };
    use lerecherche::{SearchMode, SearchOptions};
    use lestockage::{Backend, StoreConfig, TableShape};

    /// Helper: SQLite settings inside a temp dir
    fn sqlite_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            backend: Backend::Sqlite,
            db_path: dir.path().join("bench.db"),
            ..StoreConfig::default()
        }
    }

    /// Helper: write a small corpus and topic set
    fn write_fixture(dir: &TempDir) -> (PathBuf, PathBuf) {
        let corpus = dir.path().join("corpus.jsonl");
        fs::write(
            &corpus,
            concat!(
                "{\"id\": \"d1\", \"title\": \"Ducks\", \"text\": \"Ducks paddle across the pond\"}\n",
                "{\"id\": \"d2\", \"contents\": \"A goose crosses the road\"}\n",
                "{\"id\": \"d3\", \"contents\": \"Ponds freeze in winter\"}\n",
                "{\"id\": \"q2\", \"contents\": \"duck pond duck\"}\n",
            ),
        )
        .unwrap();

        let topics = dir.path().join("topics.tsv");
        fs::write(&topics, "q10\tgoose\nq2\tducks in ponds\nq9\tzebra\n").unwrap();
        (corpus, topics)
    }

    fn index_args(input: PathBuf) -> IndexArgs {
        IndexArgs {
            input,
            shape: TableShape::Lexical,
            index: Some("corpus".to_string()),
            pretokenized: false,
            dimension: None,
            batch_size: 2,
        }
    }

    fn search_args(topics: PathBuf, output: PathBuf) -> SearchArgs {
        SearchArgs {
            topics,
            search_method: None,
            index: vec!["corpus".to_string()],
            options: SearchOptions::default(),
            output,
            run_tag: None,
            query_table: None,
            skip_failed: false,
        }
    }

    #[test]
    fn test_cli_search_command_parsing() {
        let cli = Cli::parse_from([
            "lecanard",
            "search",
            "--topics",
            "topics.tsv",
            "--index",
            "corpus",
            "--output",
            "run.txt",
            "--hits",
            "10",
            "--rrf-k",
            "30",
            "--skip-failed",
        ]);

        match cli.command {
            Commands::Search {
                hits,
                rrf_k,
                skip_failed,
                search_method,
                ..
            } => {
                assert_eq!(hits, Some(10));
                assert_eq!(rrf_k, Some(30));
                assert!(skip_failed);
                assert_eq!(search_method, None);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_tokenize_command_parsing() {
        let cli = Cli::parse_from(["lecanard", "tokenize", "-i", "in.jsonl", "-o", "out.jsonl"]);
        assert!(matches!(cli.command, Commands::Tokenize { .. }));
    }

    #[test]
    fn test_index_then_search_writes_sorted_run() {
        let dir = TempDir::new().unwrap();
        let (corpus, topics) = write_fixture(&dir);
        let config = sqlite_config(&dir);

        cmd_index_impl(&config, index_args(corpus)).unwrap();

        let output = dir.path().join("run.txt");
        cmd_search_impl(&config, search_args(topics, output.clone())).unwrap();

        let run = fs::read_to_string(&output).unwrap();
        let rows: Vec<Vec<&str>> = run.lines().map(|l| l.split(' ').collect()).collect();
        assert!(!rows.is_empty());

        // q2 sorts before q10 and never retrieves itself
        assert_eq!(rows[0][0], "q2");
        assert_eq!(rows.last().unwrap()[0], "q10");
        assert!(rows.iter().all(|r| r[0] != r[2]));
        assert!(rows.iter().all(|r| r[1] == "Q0" && r[5] == "sparse_sqlite"));

        let q2_ranks: Vec<usize> = rows
            .iter()
            .filter(|r| r[0] == "q2")
            .map(|r| r[3].parse().unwrap())
            .collect();
        assert_eq!(q2_ranks, (1..=q2_ranks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_pretokenized_run_matches_raw_run() {
        let dir = TempDir::new().unwrap();
        let (corpus, topics) = write_fixture(&dir);
        let config = sqlite_config(&dir);
        cmd_index_impl(&config, index_args(corpus)).unwrap();

        let tokenized = dir.path().join("topics.tokenized.jsonl");
        cmd_tokenize_impl(&topics, &tokenized).unwrap();

        let raw_run = dir.path().join("raw.txt");
        cmd_search_impl(&config, search_args(topics, raw_run.clone())).unwrap();

        let pre_run = dir.path().join("pre.txt");
        let mut args = search_args(tokenized, pre_run.clone());
        args.options.pretokenized = true;
        cmd_search_impl(&config, args).unwrap();

        assert_eq!(
            fs::read_to_string(raw_run).unwrap(),
            fs::read_to_string(pre_run).unwrap()
        );
    }

    #[test]
    fn test_dense_search_on_sqlite_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let (corpus, topics) = write_fixture(&dir);
        let config = sqlite_config(&dir);
        cmd_index_impl(&config, index_args(corpus)).unwrap();

        let output = dir.path().join("run.txt");
        let mut args = search_args(topics, output.clone());
        args.search_method = Some(SearchMode::Dense);

        let err = cmd_search_impl(&config, args).unwrap_err();
        assert!(err.to_string().contains("does not support"));
        assert!(!output.exists());
    }

    #[test]
    fn test_configuration_errors_leave_database_untouched() {
        let dir = TempDir::new().unwrap();
        let (_, topics) = write_fixture(&dir);
        let config = StoreConfig {
            backend: Backend::Sqlite,
            db_path: dir.path().join("fresh.db"),
            ..StoreConfig::default()
        };

        let mut too_many = search_args(topics.clone(), dir.path().join("a.txt"));
        too_many.index = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = cmd_search_impl(&config, too_many).unwrap_err();
        assert!(err.to_string().contains("at most two tables"));

        let mut dense = search_args(topics, dir.path().join("b.txt"));
        dense.search_method = Some(SearchMode::Dense);
        let err = cmd_search_impl(&config, dense).unwrap_err();
        assert!(err.to_string().contains("does not support"));

        assert!(!config.db_path.exists());
    }

    #[test]
    fn test_sqlite_rejects_vector_index() {
        let dir = TempDir::new().unwrap();
        let (corpus, _) = write_fixture(&dir);
        let config = sqlite_config(&dir);

        let mut args = index_args(corpus);
        args.shape = TableShape::Vector;
        args.dimension = Some(3);
        assert!(cmd_index_impl(&config, args).is_err());
    }

    #[test]
    fn test_tokenize_writes_analyzed_jsonl() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("docs.jsonl");
        fs::write(&input, "{\"id\": 7, \"title\": \"The Ducks\", \"text\": \"are swimming\"}\n").unwrap();
        let output = dir.path().join("docs.tok.jsonl");

        cmd_tokenize_impl(&input, &output).unwrap();

        let line = fs::read_to_string(&output).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["id"], "7");
        assert_eq!(value["contents"], "duck swim");
    }
}
