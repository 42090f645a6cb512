use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use chrono::Utc;
use quick_xml::escape::escape;
use tracing::debug;
use uuid::Uuid;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::Packager;
use crate::error::{Error, Result};
use crate::util::guess_media_type;

/// Book-level metadata written to the package document.
#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    /// Explicit `dc:identifier`. Derived from the title when absent.
    pub identifier: Option<String>,
    /// `dcterms:modified` timestamp. Current time when absent.
    pub modified: Option<String>,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_modified(mut self, modified: impl Into<String>) -> Self {
        self.modified = Some(modified.into());
        self
    }

    /// The identifier that ends up in the package document.
    ///
    /// Without an explicit identifier, a name-based (v5) UUID of the title is
    /// used so rebuilding the same book yields the same identifier.
    pub fn resolved_identifier(&self) -> String {
        match &self.identifier {
            Some(id) if !id.is_empty() => id.clone(),
            _ => Uuid::new_v5(&Uuid::NAMESPACE_URL, self.title.as_bytes())
                .urn()
                .to_string(),
        }
    }
}

/// Configuration for EPUB output.
#[derive(Debug, Clone, Default)]
pub struct EpubConfig {
    /// Compression level for deflate (0-9, default 6).
    pub compression_level: Option<u32>,
}

struct Section {
    file_name: String,
    title: String,
    document: String,
    children: Vec<usize>,
}

struct Asset {
    /// Path relative to the package directory, e.g. `images/a.png`.
    href: String,
    data: Vec<u8>,
    media_type: &'static str,
}

/// Assembles an EPUB 3 book in memory and writes it as a ZIP container.
///
/// Sections form a tree: [`Packager::add_sub_section`] nests a section under
/// a previously added one. The spine and both tables of contents follow that
/// tree depth-first.
///
/// # Example
///
/// ```no_run
/// use mdepub::epub::{BookMetadata, EpubBuilder, Packager};
///
/// let mut book = EpubBuilder::new(BookMetadata::new("My Book").with_author("Me"));
/// book.add_section("<h1>One</h1>", "One", "one.xhtml", None)?;
/// book.add_sub_section("one.xhtml", "<h2>Two</h2>", "Two", "one__two.xhtml", None)?;
/// book.write("output.epub")?;
/// # Ok::<(), mdepub::Error>(())
/// ```
pub struct EpubBuilder {
    metadata: BookMetadata,
    config: EpubConfig,
    sections: Vec<Section>,
    roots: Vec<usize>,
    section_index: HashMap<String, usize>,
    assets: Vec<Asset>,
    asset_names: HashSet<String>,
    cover: Option<String>,
}

const PACKAGE_DIR: &str = "EPUB";
const COVER_PAGE: &str = "cover.xhtml";

/// `dcterms:modified` requires second precision in UTC.
const MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

impl EpubBuilder {
    /// Create a builder with default configuration.
    pub fn new(metadata: BookMetadata) -> Self {
        Self {
            metadata,
            config: EpubConfig::default(),
            sections: Vec::new(),
            roots: Vec::new(),
            section_index: HashMap::new(),
            assets: Vec::new(),
            asset_names: HashSet::new(),
            cover: None,
        }
    }

    /// Configure the builder with custom settings.
    pub fn with_config(mut self, config: EpubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    /// Number of sections added so far.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Number of images and stylesheets added so far.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Copy a stylesheet into the book. Returns the href to link from sections.
    pub fn add_css(&mut self, source: &Path, name: &str) -> Result<String> {
        self.add_asset("css", source, name)
    }

    /// Use a previously added image as the cover.
    ///
    /// `image` is the id returned by [`Packager::add_image`]. A cover page is
    /// generated at the start of the spine.
    pub fn set_cover(&mut self, image: &str) -> Result<()> {
        let href = image.trim_start_matches("../");
        if !self.assets.iter().any(|a| a.href == href) {
            return Err(Error::InvalidSection(format!("unknown cover image {image}")));
        }
        self.cover = Some(href.to_string());
        Ok(())
    }

    fn add_asset(&mut self, dir: &str, source: &Path, name: &str) -> Result<String> {
        let data = fs::read(source).map_err(|e| Error::io(source, e))?;
        let name = unique_name(&mut self.asset_names, dir, name);
        let href = format!("{dir}/{name}");
        debug!(source = %source.display(), %href, "added asset");

        self.assets.push(Asset {
            media_type: guess_media_type(&name),
            href: href.clone(),
            data,
        });
        Ok(format!("../{href}"))
    }

    fn push_section(
        &mut self,
        body: &str,
        title: &str,
        file_name: &str,
        css: Option<&str>,
    ) -> Result<usize> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(Error::InvalidSection(format!(
                "invalid section file name '{file_name}'"
            )));
        }
        if file_name == COVER_PAGE || self.section_index.contains_key(file_name) {
            return Err(Error::InvalidSection(format!(
                "duplicate section file name '{file_name}'"
            )));
        }

        let index = self.sections.len();
        self.sections.push(Section {
            file_name: file_name.to_string(),
            title: title.to_string(),
            document: section_document(body, title, css),
            children: Vec::new(),
        });
        self.section_index.insert(file_name.to_string(), index);
        Ok(index)
    }

    /// Section indices in reading order.
    fn reading_order(&self) -> Vec<usize> {
        fn walk(sections: &[Section], ids: &[usize], out: &mut Vec<usize>) {
            for &id in ids {
                out.push(id);
                walk(sections, &sections[id].children, out);
            }
        }
        let mut out = Vec::with_capacity(self.sections.len());
        walk(&self.sections, &self.roots, &mut out);
        out
    }

    /// Write the book to a file on disk.
    ///
    /// The container is assembled in memory first, so a failure leaves no
    /// partial file behind.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut buffer = Cursor::new(Vec::new());
        self.write_to(&mut buffer)?;
        fs::write(path, buffer.into_inner()).map_err(|e| Error::io(path, e))
    }

    /// Write the book to any [`Write`] + [`Seek`] destination.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);

        let compression_level = self.config.compression_level.unwrap_or(6);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level as i64));

        // 1. Write mimetype (must be first, uncompressed)
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        // 2. Write container.xml
        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML)?;

        let identifier = self.metadata.resolved_identifier();
        let order = self.reading_order();

        // 3. Package document, navigation document, legacy NCX
        zip.start_file(format!("{PACKAGE_DIR}/package.opf"), deflated)?;
        zip.write_all(self.generate_opf(&identifier, &order).as_bytes())?;

        zip.start_file(format!("{PACKAGE_DIR}/nav.xhtml"), deflated)?;
        zip.write_all(self.generate_nav().as_bytes())?;

        zip.start_file(format!("{PACKAGE_DIR}/toc.ncx"), deflated)?;
        zip.write_all(self.generate_ncx(&identifier).as_bytes())?;

        // 4. Sections
        if let Some(cover) = &self.cover {
            zip.start_file(format!("{PACKAGE_DIR}/xhtml/{COVER_PAGE}"), deflated)?;
            zip.write_all(cover_document(cover).as_bytes())?;
        }
        for &id in &order {
            let section = &self.sections[id];
            zip.start_file(
                format!("{PACKAGE_DIR}/xhtml/{}", section.file_name),
                deflated,
            )?;
            zip.write_all(section.document.as_bytes())?;
        }

        // 5. Images and stylesheets
        for asset in &self.assets {
            zip.start_file(format!("{PACKAGE_DIR}/{}", asset.href), deflated)?;
            zip.write_all(&asset.data)?;
        }

        zip.finish()?;
        Ok(())
    }

    fn generate_opf(&self, identifier: &str, order: &[usize]) -> String {
        let mut opf = String::new();

        opf.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
        );

        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
            escape(identifier)
        ));
        opf.push_str(&format!(
            "    <dc:title>{}</dc:title>\n",
            escape(self.metadata.title.as_str())
        ));

        let language = if self.metadata.language.is_empty() {
            "en"
        } else {
            self.metadata.language.as_str()
        };
        opf.push_str(&format!(
            "    <dc:language>{}</dc:language>\n",
            escape(language)
        ));

        for (i, author) in self.metadata.authors.iter().enumerate() {
            opf.push_str(&format!(
                "    <dc:creator id=\"creator{}\">{}</dc:creator>\n",
                i + 1,
                escape(author.as_str())
            ));
        }

        let modified = self
            .metadata
            .modified
            .clone()
            .unwrap_or_else(|| Utc::now().format(MODIFIED_FORMAT).to_string());
        opf.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            escape(modified.as_str())
        ));

        if self.cover.is_some() {
            opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        }

        opf.push_str("  </metadata>\n  <manifest>\n");
        opf.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
        opf.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );
        if self.cover.is_some() {
            opf.push_str(&format!(
                "    <item id=\"cover-page\" href=\"xhtml/{COVER_PAGE}\" media-type=\"application/xhtml+xml\"/>\n"
            ));
        }
        for &id in order {
            opf.push_str(&format!(
                "    <item id=\"section-{}\" href=\"xhtml/{}\" media-type=\"application/xhtml+xml\"/>\n",
                id,
                escape(self.sections[id].file_name.as_str())
            ));
        }
        for (i, asset) in self.assets.iter().enumerate() {
            let is_cover = self.cover.as_deref() == Some(asset.href.as_str());
            let id = if is_cover {
                "cover-image".to_string()
            } else {
                format!("asset-{i}")
            };
            let properties = if is_cover {
                " properties=\"cover-image\""
            } else {
                ""
            };
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
                id,
                escape(asset.href.as_str()),
                asset.media_type,
                properties
            ));
        }

        opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
        if self.cover.is_some() {
            opf.push_str("    <itemref idref=\"cover-page\" linear=\"no\"/>\n");
        }
        for &id in order {
            opf.push_str(&format!("    <itemref idref=\"section-{id}\"/>\n"));
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn generate_nav(&self) -> String {
        let mut nav = String::new();
        nav.push_str(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head>
    <meta charset="UTF-8"/>
    <title>{}</title>
  </head>
  <body>
    <nav epub:type="toc" id="toc">
"#,
            escape(self.metadata.title.as_str())
        ));
        self.write_nav_list(&mut nav, &self.roots, 3);
        nav.push_str("    </nav>\n  </body>\n</html>\n");
        nav
    }

    fn write_nav_list(&self, nav: &mut String, ids: &[usize], indent: usize) {
        if ids.is_empty() {
            return;
        }
        let indent_str = "  ".repeat(indent);
        nav.push_str(&format!("{indent_str}<ol>\n"));
        for &id in ids {
            let section = &self.sections[id];
            nav.push_str(&format!(
                "{}  <li><a href=\"xhtml/{}\">{}</a>",
                indent_str,
                escape(section.file_name.as_str()),
                escape(section.title.as_str())
            ));
            if section.children.is_empty() {
                nav.push_str("</li>\n");
            } else {
                nav.push('\n');
                self.write_nav_list(nav, &section.children, indent + 2);
                nav.push_str(&format!("{indent_str}  </li>\n"));
            }
        }
        nav.push_str(&format!("{indent_str}</ol>\n"));
    }

    fn generate_ncx(&self, identifier: &str) -> String {
        fn depth(sections: &[Section], ids: &[usize]) -> usize {
            ids.iter()
                .map(|&id| 1 + depth(sections, &sections[id].children))
                .max()
                .unwrap_or(0)
        }

        let mut ncx = String::new();
        ncx.push_str(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
    <meta name="dtb:depth" content="{}"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
"#,
            escape(identifier),
            depth(&self.sections, &self.roots).max(1),
            escape(self.metadata.title.as_str())
        ));

        let mut play_order = 1;
        self.write_nav_points(&mut ncx, &self.roots, &mut play_order, 2);

        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }

    /// Recursively write navPoint elements.
    fn write_nav_points(
        &self,
        ncx: &mut String,
        ids: &[usize],
        play_order: &mut usize,
        indent: usize,
    ) {
        let indent_str = "  ".repeat(indent);

        for &id in ids {
            let section = &self.sections[id];
            ncx.push_str(&format!(
                "{}<navPoint id=\"navPoint-{}\" playOrder=\"{}\">\n",
                indent_str, play_order, play_order
            ));
            ncx.push_str(&format!(
                "{}  <navLabel><text>{}</text></navLabel>\n",
                indent_str,
                escape(section.title.as_str())
            ));
            ncx.push_str(&format!(
                "{}  <content src=\"xhtml/{}\"/>\n",
                indent_str,
                escape(section.file_name.as_str())
            ));

            *play_order += 1;

            if !section.children.is_empty() {
                self.write_nav_points(ncx, &section.children, play_order, indent + 1);
            }

            ncx.push_str(&format!("{indent_str}</navPoint>\n"));
        }
    }
}

impl Packager for EpubBuilder {
    fn add_image(&mut self, source: &Path, name: &str) -> Result<String> {
        self.add_asset("images", source, name)
    }

    fn add_section(
        &mut self,
        body: &str,
        title: &str,
        file_name: &str,
        css: Option<&str>,
    ) -> Result<String> {
        let index = self.push_section(body, title, file_name, css)?;
        self.roots.push(index);
        Ok(file_name.to_string())
    }

    fn add_sub_section(
        &mut self,
        parent: &str,
        body: &str,
        title: &str,
        file_name: &str,
        css: Option<&str>,
    ) -> Result<String> {
        let parent_index = *self
            .section_index
            .get(parent)
            .ok_or_else(|| Error::InvalidSection(format!("unknown parent section '{parent}'")))?;
        let index = self.push_section(body, title, file_name, css)?;
        self.sections[parent_index].children.push(index);
        Ok(file_name.to_string())
    }
}

/// Container.xml template.
const CONTAINER_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Wrap a body fragment in a complete XHTML document.
fn section_document(body: &str, title: &str, css: Option<&str>) -> String {
    let stylesheet = css
        .map(|href| {
            format!(
                "    <link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"/>\n",
                escape(href)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head>
    <meta charset="UTF-8"/>
    <title>{}</title>
{}  </head>
  <body>
{}
  </body>
</html>
"#,
        escape(title),
        stylesheet,
        body
    )
}

fn cover_document(image_href: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head>
    <meta charset="UTF-8"/>
    <title>Cover</title>
  </head>
  <body>
    <div style="text-align:center;"><img src="../{}" alt="Cover" style="max-width:100%;"/></div>
  </body>
</html>
"#,
        escape(image_href)
    )
}

/// Reserve `dir/name`, appending `-2`, `-3`, ... to the stem when taken.
fn unique_name(used: &mut HashSet<String>, dir: &str, name: &str) -> String {
    if used.insert(format!("{dir}/{name}")) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if used.insert(format!("{dir}/{candidate}")) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_name(&mut used, "images", "a.png"), "a.png");
        assert_eq!(unique_name(&mut used, "images", "a.png"), "a-2.png");
        assert_eq!(unique_name(&mut used, "images", "a.png"), "a-3.png");
        assert_eq!(unique_name(&mut used, "css", "a.png"), "a.png");
        assert_eq!(unique_name(&mut used, "images", "noext"), "noext");
        assert_eq!(unique_name(&mut used, "images", "noext"), "noext-2");
    }

    #[test]
    fn test_section_document_escapes_title() {
        let doc = section_document("<p>x</p>", "Tom & Jerry", Some("../css/style.css"));
        assert!(doc.contains("<title>Tom &amp; Jerry</title>"));
        assert!(doc.contains("href=\"../css/style.css\""));
        assert!(doc.contains("<p>x</p>"));
    }

    #[test]
    fn test_section_document_without_css() {
        let doc = section_document("<p>x</p>", "T", None);
        assert!(!doc.contains("<link"));
    }

    #[test]
    fn test_duplicate_section_rejected() {
        let mut book = EpubBuilder::new(BookMetadata::new("T"));
        book.add_section("", "A", "a.xhtml", None).unwrap();
        let err = book.add_section("", "A", "a.xhtml", None).unwrap_err();
        assert!(matches!(err, Error::InvalidSection(_)));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut book = EpubBuilder::new(BookMetadata::new("T"));
        let err = book
            .add_sub_section("missing.xhtml", "", "B", "b.xhtml", None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSection(_)));
        assert_eq!(book.section_count(), 0);
    }

    #[test]
    fn test_reading_order_is_depth_first() {
        let mut book = EpubBuilder::new(BookMetadata::new("T"));
        book.add_section("", "A", "a.xhtml", None).unwrap();
        book.add_section("", "B", "b.xhtml", None).unwrap();
        book.add_sub_section("a.xhtml", "", "A1", "a__1.xhtml", None)
            .unwrap();
        let names: Vec<_> = book
            .reading_order()
            .into_iter()
            .map(|i| book.sections[i].file_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.xhtml", "a__1.xhtml", "b.xhtml"]);
    }

    #[test]
    fn test_nav_nesting() {
        let mut book = EpubBuilder::new(BookMetadata::new("T"));
        book.add_section("", "A", "a.xhtml", None).unwrap();
        book.add_sub_section("a.xhtml", "", "A1", "a__1.xhtml", None)
            .unwrap();
        let nav = book.generate_nav();
        assert_eq!(nav.matches("<ol>").count(), 2);
        assert!(nav.contains("<a href=\"xhtml/a__1.xhtml\">A1</a></li>"));

        let ncx = book.generate_ncx("id");
        assert!(ncx.contains("<meta name=\"dtb:depth\" content=\"2\"/>"));
        assert!(ncx.contains("playOrder=\"2\""));
    }

    #[test]
    fn test_identifier_from_title() {
        let meta = BookMetadata::new("Il manuale del buon dev");
        let id = meta.resolved_identifier();
        assert!(id.starts_with("urn:uuid:"));
        assert_eq!(id, meta.resolved_identifier());

        assert_eq!(
            id,
            "urn:uuid:".to_string()
                + &Uuid::new_v5(&Uuid::NAMESPACE_URL, b"Il manuale del buon dev").to_string()
        );
        assert_eq!(Uuid::parse_str(&id[9..]).unwrap().get_version_num(), 5);
        assert_ne!(id, BookMetadata::new("Another book").resolved_identifier());

        let explicit = meta.with_identifier("urn:uuid:f9298b0f-bea1-4cb6-a601-2a35027bd44e");
        assert_eq!(
            explicit.resolved_identifier(),
            "urn:uuid:f9298b0f-bea1-4cb6-a601-2a35027bd44e"
        );
    }

    #[test]
    fn test_modified_defaults_to_current_utc_time() {
        let book = EpubBuilder::new(BookMetadata::new("T"));
        let opf = book.generate_opf("id", &[]);
        let start = opf.find("dcterms:modified\">").unwrap() + "dcterms:modified\">".len();
        let value = &opf[start..start + 20];
        let written = chrono::NaiveDateTime::parse_from_str(value, MODIFIED_FORMAT).unwrap();
        let age = Utc::now().naive_utc() - written;
        assert!(age.num_seconds().abs() < 60);
    }

    #[test]
    fn test_set_cover_requires_known_image() {
        let mut book = EpubBuilder::new(BookMetadata::new("T"));
        assert!(book.set_cover("../images/cover.jpg").is_err());
    }
}
