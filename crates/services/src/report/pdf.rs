//! Single-page PDF rendering of a result.
//!
//! Emits a PDF 1.4 file using the built-in Helvetica fonts, so no font data
//! is embedded. Text outside Latin-1 is replaced with `?`.

use std::fmt::Write as _;

use exam_core::model::ResultSummary;

const PAGE_WIDTH_PT: f64 = 595.28;
const PAGE_HEIGHT_PT: f64 = 841.89;
const PT_PER_MM: f64 = 72.0 / 25.4;

const LEFT_MARGIN_MM: f64 = 20.0;
const TITLE_TOP_MM: f64 = 20.0;
const BODY_TOP_MM: f64 = 40.0;
const LINE_STEP_MM: f64 = 10.0;

const TITLE: &str = "Exam Results";
const TITLE_SIZE: u32 = 16;
const BODY_SIZE: u32 = 12;
/// Title colour, RGB 76/0/153.
const TITLE_RGB: (f64, f64, f64) = (76.0 / 255.0, 0.0, 153.0 / 255.0);

/// Render the summary as a complete PDF document.
#[must_use]
pub fn render_pdf(summary: &ResultSummary) -> Vec<u8> {
    let content = page_content(summary);
    let info = format!(
        "<< /Title {} /Producer {} /CreationDate {} >>",
        pdf_string(&format!("{TITLE} - {}", summary.identity().name())),
        pdf_string("exam"),
        pdf_string(&summary.completed_at().format("D:%Y%m%d%H%M%SZ").to_string()),
    );

    let mut doc = PdfWriter::new();
    doc.object(b"<< /Type /Catalog /Pages 2 0 R >>");
    doc.object(b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    doc.object(
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH_PT} {PAGE_HEIGHT_PT}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>"
        )
        .as_bytes(),
    );
    doc.object(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>");
    doc.object(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );
    doc.stream(&content);
    doc.object(&encode_latin1(&info));
    doc.finish(1, 7)
}

fn body_lines(summary: &ResultSummary) -> Vec<String> {
    let identity = summary.identity();
    let mut lines = vec![format!("Name: {}", identity.name())];
    if let Some(id) = identity.candidate_id() {
        lines.push(format!("ID: {id}"));
    }
    lines.push(format!(
        "Score: {} / {}",
        summary.correct_count(),
        summary.total_count()
    ));
    lines.push(format!("Percentage: {}%", summary.percentage()));
    lines.push(format!("Required: {}%", summary.pass_mark()));
    lines.push(format!("Result: {}", summary.verdict()));
    lines.push(format!(
        "Date: {}",
        summary.completed_at().format("%Y-%m-%d %H:%M UTC")
    ));
    lines
}

fn page_content(summary: &ResultSummary) -> Vec<u8> {
    let x = LEFT_MARGIN_MM * PT_PER_MM;
    let y_at = |top_mm: f64| PAGE_HEIGHT_PT - top_mm * PT_PER_MM;
    let (r, g, b) = TITLE_RGB;

    let mut ops = String::new();
    let _ = writeln!(
        ops,
        "BT /F2 {TITLE_SIZE} Tf {r:.3} {g:.3} {b:.3} rg {x:.2} {:.2} Td {} Tj ET",
        y_at(TITLE_TOP_MM),
        pdf_string(TITLE),
    );

    let mut top = BODY_TOP_MM;
    for line in body_lines(summary) {
        let _ = writeln!(
            ops,
            "BT /F1 {BODY_SIZE} Tf 0 0 0 rg {x:.2} {:.2} Td {} Tj ET",
            y_at(top),
            pdf_string(&line),
        );
        top += LINE_STEP_MM;
    }
    encode_latin1(&ops)
}

/// Literal string with `(`, `)` and `\` escaped.
fn pdf_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('(');
    for c in value.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out.push(')');
    out
}

fn encode_latin1(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(byte) if !(0x80..0xA0).contains(&byte) => byte,
            _ => b'?',
        })
        .collect()
}

/// Sequential object writer that tracks byte offsets for the xref table.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::with_capacity(2048);
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn begin(&mut self) {
        self.offsets.push(self.buf.len());
        let number = self.offsets.len();
        self.buf
            .extend_from_slice(format!("{number} 0 obj\n").as_bytes());
    }

    fn object(&mut self, body: &[u8]) {
        self.begin();
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, data: &[u8]) {
        self.begin();
        self.buf
            .extend_from_slice(format!("<< /Length {} >>\nstream\n", data.len()).as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        let xref_at = self.buf.len();
        let size = self.offsets.len() + 1;
        let mut tail = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            let _ = write!(tail, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            tail,
            "trailer\n<< /Size {size} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
        );
        self.buf.extend_from_slice(tail.as_bytes());
        self.buf
    }
}
