//! Shared fixtures for integration tests
//!
//! Builds small but well-formed PDF, EPUB and CBZ files, and stands up
//! local catalog doubles with axum.

#![allow(dead_code)]

use axum::Router;
use bindery_ingest::extractors::ChainedExtractor;
use bindery_ingest::normalize::PathNormalizer;
use bindery_ingest::pipeline::{Pipeline, PipelineConfig};
use bindery_ingest::store::{LocalObjectStore, MemorySessionStore, ObjectStore, SessionStore};
use lopdf::{dictionary, Document, Object};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use zip::write::SimpleFileOptions;

/// Minimal one-page PDF with an Info dictionary
pub fn pdf_bytes(title: &str, author: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(title),
        "Author" => Object::string_literal(author),
    });
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, body) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// EPUB 2 package with title, creator and publisher
pub fn epub_bytes(title: &str, creator: &str) -> Vec<u8> {
    let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
    let package = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{}</dc:title>
    <dc:creator opf:role="aut">{}</dc:creator>
    <dc:publisher>Test Press</dc:publisher>
    <dc:identifier id="bookid">urn:uuid:0f1d2c3b-4a59-6877-8695-a4b3c2d1e0f9</dc:identifier>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
  </spine>
</package>"#,
        title, creator
    );
    let chapter = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head><body><p>Text</p></body></html>"#;

    zip_bytes(&[
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", container),
        ("OEBPS/content.opf", &package),
        ("OEBPS/ch1.xhtml", chapter),
    ])
}

/// Comic archive carrying a ComicInfo.xml
pub fn cbz_bytes(publisher: &str, series: &str, number: &str) -> Vec<u8> {
    let comic_info = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<ComicInfo>
  <Series>{}</Series>
  <Number>{}</Number>
  <Publisher>{}</Publisher>
</ComicInfo>"#,
        series, number, publisher
    );
    zip_bytes(&[("ComicInfo.xml", &comic_info), ("001.jpg", "not really a jpeg")])
}

pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Pipeline over a local store with in-memory sessions
pub fn local_pipeline(
    store_root: &Path,
    extractor: ChainedExtractor,
    config: PipelineConfig,
) -> (Pipeline, Arc<MemorySessionStore>) {
    let sessions = Arc::new(MemorySessionStore::new());
    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(store_root));
    let session_store: Arc<dyn SessionStore> = sessions.clone();
    let pipeline = Pipeline::new(config, extractor, PathNormalizer::new(), store, session_store)
        .unwrap();
    (pipeline, sessions)
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
