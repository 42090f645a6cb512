//! EPUB container tests.
//!
//! Builds small books with `EpubBuilder` and inspects the written ZIP: entry
//! order, package document manifest and spine, navigation documents.

use std::fs;
use std::io::{Cursor, Read};

use mdepub::{BookMetadata, EpubBuilder, EpubConfig, Error, Packager};
use quick_xml::Reader;
use quick_xml::events::Event;
use tempfile::TempDir;
use zip::ZipArchive;

/// Parsed bits of package.opf.
#[derive(Debug, Default)]
struct Package {
    items: Vec<(String, String, String)>,
    spine: Vec<String>,
    title: String,
    identifier: String,
}

fn write_to_memory(book: &EpubBuilder) -> ZipArchive<Cursor<Vec<u8>>> {
    let mut buffer = Cursor::new(Vec::new());
    book.write_to(&mut buffer).expect("Failed to write EPUB");
    ZipArchive::new(Cursor::new(buffer.into_inner())).expect("Failed to reopen EPUB")
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let mut file = archive.by_name(name).expect("missing entry");
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    content
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8(a.value.to_vec()).unwrap())
}

fn parse_package(opf: &str) -> Package {
    let mut reader = Reader::from_str(opf);
    let mut package = Package::default();
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event().expect("malformed package document") {
            Event::Start(e) => current = Some(e.name().as_ref().to_vec()),
            Event::Text(t) => {
                let text = String::from_utf8(t.to_vec()).unwrap();
                match current.as_deref() {
                    Some(b"dc:title") => package.title.push_str(&text),
                    Some(b"dc:identifier") => package.identifier.push_str(&text),
                    _ => {}
                }
            }
            Event::End(_) => current = None,
            Event::Empty(e) => match e.name().as_ref() {
                b"item" => package.items.push((
                    attr(&e, b"id").unwrap(),
                    attr(&e, b"href").unwrap(),
                    attr(&e, b"media-type").unwrap(),
                )),
                b"itemref" => package.spine.push(attr(&e, b"idref").unwrap()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    package
}

fn spine_hrefs(package: &Package) -> Vec<String> {
    package
        .spine
        .iter()
        .map(|idref| {
            package
                .items
                .iter()
                .find(|(id, _, _)| id == idref)
                .map(|(_, href, _)| href.clone())
                .expect("spine references unknown item")
        })
        .collect()
}

#[test]
fn test_mimetype_first_and_stored() {
    let book = EpubBuilder::new(BookMetadata::new("Test Book"));
    let mut archive = write_to_memory(&book);

    let first = archive.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    drop(first);

    assert_eq!(read_entry(&mut archive, "mimetype"), "application/epub+zip");
    let container = read_entry(&mut archive, "META-INF/container.xml");
    assert!(container.contains("full-path=\"EPUB/package.opf\""));
}

#[test]
fn test_metadata_written() {
    let book = EpubBuilder::new(
        BookMetadata::new("Il manuale del buon dev")
            .with_author("Community")
            .with_language("it")
            .with_identifier("urn:uuid:f9298b0f-bea1-4cb6-a601-2a35027bd44e")
            .with_modified("2024-05-01T00:00:00Z"),
    );
    let mut archive = write_to_memory(&book);
    let opf = read_entry(&mut archive, "EPUB/package.opf");
    let package = parse_package(&opf);

    assert_eq!(package.title, "Il manuale del buon dev");
    assert_eq!(
        package.identifier,
        "urn:uuid:f9298b0f-bea1-4cb6-a601-2a35027bd44e"
    );
    assert!(opf.contains("<dc:language>it</dc:language>"));
    assert!(opf.contains(">Community</dc:creator>"));
    assert!(opf.contains("<meta property=\"dcterms:modified\">2024-05-01T00:00:00Z</meta>"));
}

#[test]
fn test_sections_spine_depth_first() {
    let mut book = EpubBuilder::new(BookMetadata::new("Nested"));
    book.add_section("<p>x</p>", "X", "x.xhtml", None).unwrap();
    book.add_section("<p>v</p>", "V", "v.xhtml", None).unwrap();
    book.add_sub_section("x.xhtml", "<p>y</p>", "Y", "x__y.xhtml", None)
        .unwrap();
    book.add_sub_section("x__y.xhtml", "<p>z</p>", "Z", "x__y__z.xhtml", None)
        .unwrap();

    let mut archive = write_to_memory(&book);
    let package = parse_package(&read_entry(&mut archive, "EPUB/package.opf"));

    assert_eq!(
        spine_hrefs(&package),
        vec![
            "xhtml/x.xhtml",
            "xhtml/x__y.xhtml",
            "xhtml/x__y__z.xhtml",
            "xhtml/v.xhtml"
        ]
    );

    let section = read_entry(&mut archive, "EPUB/xhtml/x__y__z.xhtml");
    assert!(section.contains("<title>Z</title>"));
    assert!(section.contains("<p>z</p>"));

    let nav = read_entry(&mut archive, "EPUB/nav.xhtml");
    assert_eq!(nav.matches("<ol>").count(), 3);

    let ncx = read_entry(&mut archive, "EPUB/toc.ncx");
    assert!(ncx.contains("<meta name=\"dtb:depth\" content=\"3\"/>"));
    assert_eq!(ncx.matches("<navPoint ").count(), 4);
}

#[test]
fn test_images_and_css() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("diagram.png");
    let css = tmp.path().join("style.css");
    fs::write(&image, b"\x89PNG\r\n\x1a\nfake").unwrap();
    fs::write(&css, "body { margin: 0; }").unwrap();

    let mut book = EpubBuilder::new(BookMetadata::new("Assets"));
    let image_id = book.add_image(&image, "book_img_diagram.png").unwrap();
    let again = book.add_image(&image, "book_img_diagram.png").unwrap();
    let css_href = book.add_css(&css, "style.css").unwrap();
    book.add_section(
        &format!("<img src=\"{image_id}\" alt=\"\"/>"),
        "One",
        "one.xhtml",
        Some(&css_href),
    )
    .unwrap();

    assert_eq!(image_id, "../images/book_img_diagram.png");
    assert_eq!(again, "../images/book_img_diagram-2.png");
    assert_eq!(css_href, "../css/style.css");
    assert_eq!(book.asset_count(), 3);

    let mut archive = write_to_memory(&book);
    let package = parse_package(&read_entry(&mut archive, "EPUB/package.opf"));
    let media: Vec<_> = package
        .items
        .iter()
        .filter(|(_, href, _)| href.starts_with("images/") || href.starts_with("css/"))
        .map(|(_, href, media)| (href.as_str(), media.as_str()))
        .collect();
    assert_eq!(
        media,
        vec![
            ("images/book_img_diagram.png", "image/png"),
            ("images/book_img_diagram-2.png", "image/png"),
            ("css/style.css", "text/css"),
        ]
    );

    let mut data = Vec::new();
    archive
        .by_name("EPUB/images/book_img_diagram.png")
        .unwrap()
        .read_to_end(&mut data)
        .unwrap();
    assert_eq!(data, b"\x89PNG\r\n\x1a\nfake");

    let section = read_entry(&mut archive, "EPUB/xhtml/one.xhtml");
    assert!(section.contains("href=\"../css/style.css\""));
}

#[test]
fn test_missing_image_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let mut book = EpubBuilder::new(BookMetadata::new("T"));
    let err = book
        .add_image(&tmp.path().join("nope.png"), "nope.png")
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(book.asset_count(), 0);
}

#[test]
fn test_cover_page() {
    let tmp = TempDir::new().unwrap();
    let cover = tmp.path().join("cover.jpg");
    fs::write(&cover, b"\xFF\xD8\xFFfake").unwrap();

    let mut book = EpubBuilder::new(BookMetadata::new("Covered"));
    let id = book.add_image(&cover, "cover.jpg").unwrap();
    book.set_cover(&id).unwrap();
    book.add_section("<p>a</p>", "A", "a.xhtml", None).unwrap();

    let mut archive = write_to_memory(&book);
    let opf = read_entry(&mut archive, "EPUB/package.opf");
    let package = parse_package(&opf);

    assert!(opf.contains("properties=\"cover-image\""));
    assert_eq!(package.spine.first().map(String::as_str), Some("cover-page"));
    let page = read_entry(&mut archive, "EPUB/xhtml/cover.xhtml");
    assert!(page.contains("src=\"../images/cover.jpg\""));
}

#[test]
fn test_write_to_disk_with_compression() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("book.epub");

    let mut book = EpubBuilder::new(BookMetadata::new("Disk")).with_config(EpubConfig {
        compression_level: Some(9),
    });
    book.add_section(&"<p>lorem ipsum</p>\n".repeat(200), "A", "a.xhtml", None)
        .unwrap();
    book.write(&output).unwrap();

    let mut archive = ZipArchive::new(fs::File::open(&output).unwrap()).unwrap();
    let entry = archive.by_name("EPUB/xhtml/a.xhtml").unwrap();
    assert_eq!(entry.compression(), zip::CompressionMethod::Deflated);
    assert!(entry.compressed_size() < entry.size());
}
