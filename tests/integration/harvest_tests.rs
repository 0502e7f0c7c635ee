use crate::fast_fetcher_config;
use catalog_harvest::config::{CatalogConfig, Config, NamesConfig, OutputConfig};
use catalog_harvest::consolidate::ConsolidationReport;
use catalog_harvest::storage::{SqliteStorage, Storage};
use catalog_harvest::{CrawlStatus, Harvester};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE_BYTES: &[u8] = b"\x89PNG fake diagram";

fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    let base = format!("{}/cat/", server.uri());
    Config {
        fetcher: fast_fetcher_config(2),
        catalog: CatalogConfig {
            seeds: vec![format!("{}engine/engine-assy/", base)],
            base_url: base,
            frame_number: Some("PD6W-0500001".to_string()),
        },
        output: OutputConfig {
            database_path: dir.path().join("catalog.db").to_string_lossy().into_owned(),
            images_dir: dir.path().join("images").to_string_lossy().into_owned(),
        },
        names: NamesConfig {
            strip_phrases: vec!["Parts Catalog".to_string()],
        },
    }
}

fn harvester(config: Config) -> Harvester {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    Harvester::with_storage(config, storage).unwrap()
}

/// Listing page with two sections that point at the same diagram image
fn listing_page(server: &MockServer) -> String {
    format!(
        r#"<html><head><title>Engine Assy - Parts Catalog</title></head><body>
        <h1>Engine Assy - Parts Catalog</h1>
        <table><tr>
          <td class="detail-list">
            <h3>Cylinder Head</h3>
            <img src="{uri}/img/engine-engine-assy-12159.png" alt="Cylinder Head">
            <a href="100/">Head</a>
          </td>
          <td class="detail-list">
            <h3>Rocker Cover</h3>
            <img src="{uri}/img/engine-engine-assy-12159.png" alt="Rocker Cover">
            <a href="200/">Cover</a>
            <a href="/elsewhere/300/">Unrelated</a>
          </td>
        </tr></table>
        </body></html>"#,
        uri = server.uri()
    )
}

fn parts_page(rows: &[[&str; 4]]) -> String {
    let rows: String = rows
        .iter()
        .map(|[ref_no, number, pnc, description]| {
            format!(
                "<tr><td>{ref_no}</td><td>{number}</td><td>{pnc}</td><td>{description}</td><td>1</td></tr>"
            )
        })
        .collect();
    format!(
        r#"<html><body><table class="parts">
        <tr><th>Ref</th><th>Part Number</th><th>PNC</th><th>Description</th><th>Qty</th></tr>
        {rows}
        </table></body></html>"#
    )
}

async fn mount_catalog(server: &MockServer, listing_hits: u64) {
    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(server)))
        .expect(listing_hits)
        .mount(server)
        .await;

    // Each detail page is fetched once; re-scrapes skip pages that already have parts
    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/100/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(parts_page(&[
            ["1", "MD100001", "11010", "GASKET, CYLINDER HEAD"],
            ["", "MD100002", "", ""],
            ["2", "MD100003", "11020", "BOLT, CYLINDER HEAD"],
        ])))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/200/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(parts_page(&[
            ["1", "MD100001", "11010", "GASKET, CYLINDER HEAD"],
            ["3", "MD200001", "11213", "COVER, ROCKER"],
        ])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/engine-engine-assy-12159.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_BYTES.to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_harvest_and_consolidation() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_catalog(&server, 2).await;

    let config = test_config(&server, &dir);
    let seed = config.catalog.seeds[0].clone();
    let mut harvester = harvester(config);

    assert_eq!(harvester.seed().unwrap(), 1);

    let crawl = harvester.crawl_pending().await.unwrap();
    assert_eq!(crawl.completed, 1);
    assert_eq!(crawl.failed, 0);
    assert_eq!(crawl.parts_inserted, 5);
    assert_eq!(
        harvester.storage().url_status(&seed).unwrap().unwrap().status,
        CrawlStatus::Completed
    );

    {
        let storage = harvester.storage();
        assert_eq!(storage.get_group("engine").unwrap().unwrap().name, "Engine");
        let head = storage
            .get_subgroup("engine/engine-assy/cylinder-head")
            .unwrap()
            .unwrap();
        assert_eq!(head.name, "Engine Assy - Cylinder Head");
        assert_eq!(head.path, "engine/engine-assy");
        assert_eq!(storage.count_diagrams().unwrap(), 2);
    }

    // A second listing pass has nothing left to fetch
    assert_eq!(harvester.crawl_pending().await.unwrap().attempted, 0);

    // Re-scrape fetches the listing again but no detail page
    let rescrape = harvester.rescrape_completed().await.unwrap();
    assert_eq!(rescrape.completed, 1);
    assert_eq!(rescrape.parts_inserted, 0);

    let replacements = harvester.merge_replacements().unwrap();
    assert_eq!(replacements.merged, 1);
    assert!(replacements.unmerged.is_empty());

    let images = harvester.download_images().await.unwrap();
    assert_eq!(images.downloaded, 1);
    assert_eq!(images.reused, 1);

    let report = harvester.consolidate().unwrap();
    assert_eq!(report.images.renamed, 1);
    assert_eq!(report.diagrams.merged, 1);
    assert_eq!(report.diagrams.parts_dropped, 1);
    assert_eq!(report.diagrams.parts_moved, 1);

    let storage = harvester.storage();
    assert_eq!(storage.count_diagrams().unwrap(), 1);

    let diagram = storage
        .get_diagram("engine/engine-assy/cylinder-head")
        .unwrap()
        .unwrap();
    let image_path = diagram.image_path.unwrap();
    assert!(image_path.ends_with("engine-engine-assy.png"), "{image_path}");
    assert_eq!(std::fs::read(&image_path).unwrap(), IMAGE_BYTES);

    let files: Vec<_> = std::fs::read_dir(dir.path().join("images"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files.len(), 1);

    let parts = storage
        .parts_for_diagram("engine/engine-assy/cylinder-head")
        .unwrap();
    let numbers: Vec<&str> = parts.iter().map(|p| p.part.part_number.as_str()).collect();
    assert_eq!(numbers, vec!["MD100001", "MD100003", "MD200001"]);
    assert_eq!(
        parts[0].part.replacement_part_number.as_deref(),
        Some("MD100002")
    );

    let collisions = storage
        .execute_query(
            "SELECT diagram_id, part_number FROM parts
             GROUP BY diagram_id, part_number HAVING COUNT(*) > 1",
        )
        .unwrap();
    assert!(collisions.is_empty());

    let orphans = storage
        .execute_query(
            "SELECT p.id FROM parts p LEFT JOIN diagrams d ON p.diagram_id = d.id
             WHERE d.id IS NULL",
        )
        .unwrap();
    assert!(orphans.is_empty());

    // Search sees the consolidated rows
    let hits = storage.search_parts("rocker").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].part.diagram_id, "engine/engine-assy/cylinder-head");

    // Everything is idempotent from here
    let again = harvester.consolidate().unwrap();
    assert_eq!(again, ConsolidationReport::default());

    let tags = harvester.regenerate_tags().unwrap();
    assert_eq!(tags.parts_scanned, 3);
    assert_eq!(tags.per_tag.get("gasket"), Some(&1));
    assert_eq!(tags.per_tag.get("engine"), Some(&3));
}

#[tokio::test]
async fn test_failed_listing_is_retried_on_next_pass() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_catalog(&server, 1).await;

    let config = test_config(&server, &dir);
    let seed = config.catalog.seeds[0].clone();
    let mut harvester = harvester(config);
    harvester.seed().unwrap();

    let first = harvester.crawl_pending().await.unwrap();
    assert_eq!(first.failed, 1);
    let record = harvester.storage().url_status(&seed).unwrap().unwrap();
    assert_eq!(record.status, CrawlStatus::Failed);
    assert!(record.error.unwrap().contains("503"));

    let second = harvester.crawl_pending().await.unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(second.parts_inserted, 5);
    assert_eq!(
        harvester.storage().url_status(&seed).unwrap().unwrap().status,
        CrawlStatus::Completed
    );

    // The image mock expects one download
    harvester.download_images().await.unwrap();
}

#[tokio::test]
async fn test_single_section_without_image_keeps_its_parts() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>Engine Assy - Parts Catalog</title></head><body>
            <table><tr><td class="detail-list">
              <h3>Cylinder Head</h3>
              <a href="100/">Head</a>
            </td></tr></table>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/100/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(parts_page(&[
            ["1", "MD100001", "11010", "GASKET, CYLINDER HEAD"],
            ["2", "MD100003", "11020", "BOLT, CYLINDER HEAD"],
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let mut harvester = harvester(test_config(&server, &dir));
    harvester.seed().unwrap();

    let crawl = harvester.crawl_pending().await.unwrap();
    assert_eq!(crawl.completed, 1);
    assert_eq!(crawl.parts_inserted, 2);

    let storage = harvester.storage();
    let diagram = storage.get_diagram("engine/engine-assy").unwrap().unwrap();
    assert!(diagram.image_url.is_none());
    let parts = storage.parts_for_diagram("engine/engine-assy").unwrap();
    let numbers: Vec<&str> = parts.iter().map(|p| p.part.part_number.as_str()).collect();
    assert_eq!(numbers, vec!["MD100001", "MD100003"]);
    assert!(parts
        .iter()
        .all(|p| p.part.subgroup_id.as_deref() == Some("engine/engine-assy")));

    // Nothing to download for a diagram without an image URL
    let images = harvester.download_images().await.unwrap();
    assert_eq!(images.downloaded + images.reused + images.failed, 0);
}

#[tokio::test]
async fn test_image_write_error_does_not_stop_the_pass() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cat/engine/engine-assy/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><table><tr>
              <td class="detail-list">
                <h3>Cylinder Head</h3>
                <img src="{uri}/img/head.png">
                <a href="100/">Head</a>
              </td>
              <td class="detail-list">
                <h3>Oil Pan</h3>
                <img src="{uri}/img/pan.png">
                <a href="200/">Pan</a>
              </td>
            </tr></table></body></html>"#,
            uri = server.uri()
        )))
        .mount(&server)
        .await;
    for detail in ["/cat/engine/engine-assy/100/", "/cat/engine/engine-assy/200/"] {
        Mock::given(method("GET"))
            .and(path(detail))
            .respond_with(ResponseTemplate::new(200).set_body_string(parts_page(&[])))
            .mount(&server)
            .await;
    }
    for image in ["/img/head.png", "/img/pan.png"] {
        Mock::given(method("GET"))
            .and(path(image))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_BYTES.to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = test_config(&server, &dir);
    let images_dir = Path::new(&config.output.images_dir).to_path_buf();
    let mut harvester = harvester(config);
    harvester.seed().unwrap();
    assert_eq!(harvester.crawl_pending().await.unwrap().completed, 1);

    // A directory where the temporary file goes makes the write fail
    std::fs::create_dir_all(images_dir.join("head.png.partial")).unwrap();

    let images = harvester.download_images().await.unwrap();
    assert_eq!(images.failed, 1);
    assert_eq!(images.downloaded, 1);

    let storage = harvester.storage();
    let head = storage
        .get_diagram("engine/engine-assy/cylinder-head")
        .unwrap()
        .unwrap();
    assert!(head.image_path.is_none());
    let pan = storage
        .get_diagram("engine/engine-assy/oil-pan")
        .unwrap()
        .unwrap();
    assert!(pan.image_path.unwrap().ends_with("pan.png"));
    assert!(!images_dir.join("head.png").exists());
    assert_eq!(std::fs::read(images_dir.join("pan.png")).unwrap(), IMAGE_BYTES);
}
