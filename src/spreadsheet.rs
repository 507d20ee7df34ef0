//! `.xlsx` list of downloaded documents.
//!
//! The workbook is assembled directly as an OOXML package: a zip container with
//! one worksheet, a styles part for the header row, and a table part that gives
//! the data range its banded style.

use chrono::{DateTime, Local};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ProcessError, Result};
use crate::fs_utils::{resolve_unique_name, timestamped_file_name};
use crate::models::DownloadedFile;

pub const SHEET_TITLE: &str = "Lista de Documentos";
pub const TABLE_NAME: &str = "TablaDocumentos";
pub const TABLE_STYLE: &str = "TableStyleMedium2";
pub const HEADER_FILL: &str = "FF16A085";
pub const HEADERS: [&str; 5] = [
    "Nº",
    "Nombre del archivo",
    "Fecha de descarga",
    "Fecha correo",
    "Hora correo",
];

const MAX_COLUMN_WIDTH: usize = 60;
const COLUMN_LETTERS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/tables/table1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml"/></Types>"#;

/// One spreadsheet row: sequence, name, download timestamp, message date and time
fn row_values(sequence: usize, file: &DownloadedFile) -> [String; 5] {
    [
        sequence.to_string(),
        file.name.clone(),
        file.downloaded_at.format("%d/%m/%Y %H:%M:%S").to_string(),
        file.message_date.clone(),
        file.message_time.clone(),
    ]
}

/// `min(longest value + 2, 60)` per column, header included
pub fn column_widths(rows: &[[String; 5]]) -> [usize; 5] {
    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(value.chars().count());
        }
    }
    widths.map(|width| (width + 2).min(MAX_COLUMN_WIDTH))
}

fn cell_ref(column: usize, row: usize) -> String {
    format!("{}{}", COLUMN_LETTERS[column], row)
}

fn inline_string_cell(reference: &str, value: &str, style: Option<u32>) -> String {
    let style = style.map(|s| format!(" s=\"{}\"", s)).unwrap_or_default();
    format!(
        "<c r=\"{}\" t=\"inlineStr\"{}><is><t xml:space=\"preserve\">{}</t></is></c>",
        reference,
        style,
        escape(value)
    )
}

fn worksheet_xml(rows: &[[String; 5]]) -> String {
    let last_row = rows.len() + 1;
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    let _ = write!(
        xml,
        "\n<worksheet xmlns=\"{}\" xmlns:r=\"{}\"><dimension ref=\"A1:{}\"/>",
        NS_MAIN,
        NS_REL,
        cell_ref(4, last_row)
    );

    xml.push_str("<cols>");
    for (index, width) in column_widths(rows).iter().enumerate() {
        let _ = write!(
            xml,
            "<col min=\"{0}\" max=\"{0}\" width=\"{1}\" customWidth=\"1\"/>",
            index + 1,
            width
        );
    }
    xml.push_str("</cols><sheetData>");

    xml.push_str("<row r=\"1\">");
    for (column, header) in HEADERS.iter().enumerate() {
        xml.push_str(&inline_string_cell(&cell_ref(column, 1), header, Some(1)));
    }
    xml.push_str("</row>");

    for (offset, values) in rows.iter().enumerate() {
        let row = offset + 2;
        let _ = write!(xml, "<row r=\"{}\">", row);
        // Sequence is numeric; the remaining columns are text
        let _ = write!(xml, "<c r=\"{}\"><v>{}</v></c>", cell_ref(0, row), values[0]);
        for (column, value) in values.iter().enumerate().skip(1) {
            xml.push_str(&inline_string_cell(&cell_ref(column, row), value, None));
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData><tableParts count=\"1\"><tablePart r:id=\"rId1\"/></tableParts></worksheet>");
    xml
}

fn table_xml(row_count: usize) -> String {
    let range = format!("A1:{}", cell_ref(4, row_count + 1));
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    let _ = write!(
        xml,
        "\n<table xmlns=\"{}\" id=\"1\" name=\"{name}\" displayName=\"{name}\" ref=\"{range}\" totalsRowShown=\"0\"><autoFilter ref=\"{range}\"/><tableColumns count=\"{}\">",
        NS_MAIN,
        HEADERS.len(),
        name = TABLE_NAME,
        range = range
    );
    for (index, header) in HEADERS.iter().enumerate() {
        let _ = write!(
            xml,
            "<tableColumn id=\"{}\" name=\"{}\"/>",
            index + 1,
            escape(*header)
        );
    }
    let _ = write!(
        xml,
        "</tableColumns><tableStyleInfo name=\"{}\" showFirstColumn=\"0\" showLastColumn=\"0\" showRowStripes=\"1\" showColumnStripes=\"0\"/></table>",
        TABLE_STYLE
    );
    xml
}

fn workbook_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets><sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>",
        NS_MAIN,
        NS_REL,
        escape(SHEET_TITLE)
    )
}

fn styles_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<styleSheet xmlns=\"{}\">\
<fonts count=\"2\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font><font><b/><sz val=\"11\"/><color rgb=\"FFFFFFFF\"/><name val=\"Calibri\"/></font></fonts>\
<fills count=\"3\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill><fill><patternFill patternType=\"solid\"><fgColor rgb=\"{}\"/><bgColor indexed=\"64\"/></patternFill></fill></fills>\
<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
<cellXfs count=\"2\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>\
<xf numFmtId=\"0\" fontId=\"1\" fillId=\"2\" borderId=\"0\" xfId=\"0\" applyFont=\"1\" applyFill=\"1\" applyAlignment=\"1\"><alignment horizontal=\"center\" vertical=\"center\"/></xf></cellXfs>\
<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles></styleSheet>",
        NS_MAIN, HEADER_FILL
    )
}

fn relationships_xml(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{}\">",
        NS_PKG_REL
    );
    for (id, kind, target) in entries {
        let _ = write!(
            xml,
            "<Relationship Id=\"{}\" Type=\"{}/{}\" Target=\"{}\"/>",
            id, NS_REL, kind, target
        );
    }
    xml.push_str("</Relationships>");
    xml
}

/// Package parts in write order
fn package_parts(files: &[DownloadedFile]) -> Vec<(&'static str, String)> {
    let rows: Vec<[String; 5]> = files
        .iter()
        .enumerate()
        .map(|(index, file)| row_values(index + 1, file))
        .collect();

    vec![
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        (
            "_rels/.rels",
            relationships_xml(&[("rId1", "officeDocument", "xl/workbook.xml")]),
        ),
        ("xl/workbook.xml", workbook_xml()),
        (
            "xl/_rels/workbook.xml.rels",
            relationships_xml(&[
                ("rId1", "worksheet", "worksheets/sheet1.xml"),
                ("rId2", "styles", "styles.xml"),
            ]),
        ),
        ("xl/styles.xml", styles_xml()),
        ("xl/worksheets/sheet1.xml", worksheet_xml(&rows)),
        (
            "xl/worksheets/_rels/sheet1.xml.rels",
            relationships_xml(&[("rId1", "table", "../tables/table1.xml")]),
        ),
        ("xl/tables/table1.xml", table_xml(rows.len())),
    ]
}

/// Write the document list into `folder` and return the created path.
///
/// The name is `<prefix>_fecha(dd.mm.YYYY)_hora(HH.MM.SS).xlsx`, suffixed if taken.
pub fn write_document_list(
    folder: &Path,
    prefix: &str,
    files: &[DownloadedFile],
    at: DateTime<Local>,
) -> Result<PathBuf> {
    if files.is_empty() {
        return Err(ProcessError::Spreadsheet("no hay archivos para listar".to_string()));
    }

    let path = resolve_unique_name(&folder.join(timestamped_file_name(prefix, "xlsx", at)));
    let file = File::create(&path)
        .map_err(|e| ProcessError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(file);
    for (name, content) in package_parts(files) {
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())
            .map_err(|e| ProcessError::Spreadsheet(e.to_string()))?;
    }
    zip.finish()?;

    debug!("Wrote {} rows to {:?}", files.len(), path);
    Ok(path)
}
