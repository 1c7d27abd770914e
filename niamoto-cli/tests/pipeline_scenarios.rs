//! Full `import` -> `transform` -> `export` pipeline scenario (§8 scenario
//! 5), driven through the same `Session`/subcommand functions `niamoto-cli`'s
//! `main` uses, rather than any single crate's API in isolation.
//!
//! `context::open` only reads `STORE_PATH`/`PROJECT_HOME` as *overrides*; a
//! `project_home` passed explicitly keeps the store under
//! `<project_home>/.niamoto/store` regardless of the process environment,
//! so these tests need no env var juggling to stay parallel-safe.

use std::collections::HashMap;
use std::io::Write;

use niamoto_core::config::{
    ConnectorSpec, DatasetSpec, ExportConfig, ExportTarget, ExportTargetParams, GroupDescriptor,
    HierarchySpec, IdStrategy, ImportConfig, ImportEntities, IncompleteRowsPolicy, LinkSpec,
    NiamotoConfig, ReferenceKind, ReferenceSpec, SchemaFieldSpec, SchemaSpec, TransformSection,
    TransformSource, WidgetSpec,
};

use niamoto_cli::{commands, context};

fn field(name: &str) -> SchemaFieldSpec {
    SchemaFieldSpec { source: name.into(), target: name.into(), r#type: None }
}

/// Import a `plots` reference plus a linked `occurrences` dataset, transform
/// a per-plot row count, then export twice with deterministic timestamps
/// and assert the HTML output is byte-identical both times.
#[tokio::test]
async fn html_export_is_byte_identical_across_reruns() {
    let tmp = tempfile::tempdir().unwrap();
    let project_home = tmp.path().join("project");
    std::fs::create_dir_all(&project_home).unwrap();

    let plots_csv = project_home.join("plots.csv");
    let mut f = std::fs::File::create(&plots_csv).unwrap();
    writeln!(f, "id,name").unwrap();
    writeln!(f, "1,PlotA").unwrap();
    writeln!(f, "2,PlotB").unwrap();

    let occurrences_csv = project_home.join("occurrences.csv");
    let mut f = std::fs::File::create(&occurrences_csv).unwrap();
    writeln!(f, "id,plot_id,dbh").unwrap();
    writeln!(f, "1,1,10.0").unwrap();
    writeln!(f, "2,1,20.0").unwrap();
    writeln!(f, "3,2,30.0").unwrap();

    let mut datasets = HashMap::new();
    datasets.insert(
        "occurrences".to_string(),
        DatasetSpec {
            connector: ConnectorSpec::File { path: occurrences_csv.to_string_lossy().into() },
            schema: SchemaSpec { id_field: Some("id".into()), fields: vec![field("id"), field("plot_id"), field("dbh")] },
            options: HashMap::new(),
            links: vec![LinkSpec { peer_entity: "plots".into(), local_field: "plot_id".into(), peer_field: "id".into() }],
        },
    );

    let mut references = HashMap::new();
    references.insert(
        "plots".to_string(),
        ReferenceSpec {
            kind: ReferenceKind::Flat,
            connector: ConnectorSpec::File { path: plots_csv.to_string_lossy().into() },
            schema: SchemaSpec { id_field: Some("id".into()), fields: vec![field("id"), field("name")] },
            hierarchy: None,
            enrichment: None,
        },
    );

    let output_dir = tmp.path().join("out");
    std::fs::create_dir_all(&output_dir).unwrap();

    let mut widgets = HashMap::new();
    widgets.insert("a".to_string(), WidgetSpec { plugin: "field_count".into(), params: HashMap::from([("source".to_string(), serde_json::json!("occ"))]) });

    let config = NiamotoConfig {
        version: "2.0".into(),
        import: ImportConfig { entities: ImportEntities { datasets, references } },
        transform: vec![TransformSection {
            group_by: "plots".into(),
            sources: vec![TransformSource { name: "occ".into(), data: "occurrences".into(), relation: None }],
            widgets,
        }],
        export: ExportConfig {
            targets: vec![ExportTarget {
                name: "html".into(),
                exporter: "html_page".into(),
                params: ExportTargetParams {
                    output_dir: output_dir.to_string_lossy().into(),
                    groups: vec![GroupDescriptor { entity: "plots".into(), widgets: vec!["a".into()] }],
                    deterministic_timestamps: true,
                    params: HashMap::new(),
                },
            }],
        },
    };

    let session = context::open(project_home.clone()).await.unwrap();

    let import_run = commands::import::run(&session, &config).await.unwrap();
    assert!(import_run.errors.is_empty(), "import reported errors: {:?}", import_run.errors);

    let (transform_run, orchestrator) = commands::transform::run(&session, &config).await.unwrap();
    assert!(transform_run.errors.is_empty(), "transform reported errors: {:?}", transform_run.errors);

    let export_run_one = commands::export::run(&session, &config, orchestrator.payload_store()).await.unwrap();
    assert!(export_run_one.errors.is_empty(), "first export reported errors: {:?}", export_run_one.errors);
    let first_group_html = std::fs::read(output_dir.join("PlotA.html")).unwrap();
    let first_index_html = std::fs::read(output_dir.join("index.html")).unwrap();

    let export_run_two = commands::export::run(&session, &config, orchestrator.payload_store()).await.unwrap();
    assert!(export_run_two.errors.is_empty(), "second export reported errors: {:?}", export_run_two.errors);
    let second_group_html = std::fs::read(output_dir.join("PlotA.html")).unwrap();
    let second_index_html = std::fs::read(output_dir.join("index.html")).unwrap();

    assert_eq!(first_group_html, second_group_html, "per-group page must be byte-identical across reruns");
    assert_eq!(first_index_html, second_index_html, "index page must be byte-identical across reruns");
    assert!(first_group_html.windows(b"count".len()).any(|w| w == b"count"), "rendered page should contain the field_count payload");
}
