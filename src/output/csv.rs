use crate::model::ScanResult;

const HEADER: [&str; 9] = [
    "id",
    "severity",
    "cvss_score",
    "ecosystem",
    "package",
    "version",
    "fixed_version",
    "summary",
    "references",
];

/// One row per vulnerability, in report order. Fields are quoted as
/// RFC 4180 requires; references are joined with a space.
pub fn export_csv(result: &ScanResult) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|h| h.to_string()));

    for vuln in &result.vulnerabilities {
        let package = &vuln.affected_package;
        push_row(
            &mut out,
            [
                vuln.id.clone(),
                vuln.severity.as_str().to_string(),
                vuln.cvss_score.map(|s| format!("{s:.1}")).unwrap_or_default(),
                package.ecosystem.osv_name().to_string(),
                package.name.clone(),
                package.version.clone().unwrap_or_default(),
                vuln.fixed_version.clone().unwrap_or_default(),
                vuln.summary.clone(),
                vuln.references.join(" "),
            ],
        );
    }

    out
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape(&field));
    }
    out.push_str("\r\n");
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ecosystem, PackageQuery, Severity, Vulnerability};

    fn vuln(id: &str, summary: &str) -> Vulnerability {
        Vulnerability {
            id: id.to_string(),
            aliases: vec![],
            cve: None,
            summary: summary.to_string(),
            severity: Severity::Critical,
            cvss_score: Some(9.8),
            references: vec!["https://a.example".into(), "https://b.example".into()],
            published: None,
            fixed_version: None,
            affected_package: PackageQuery::new(Ecosystem::Pypi, "django", Some("2.2.0".into())),
        }
    }

    #[test]
    fn test_empty_result_is_header_only() {
        let csv = export_csv(&ScanResult::empty("repo"));
        assert_eq!(
            csv,
            "id,severity,cvss_score,ecosystem,package,version,fixed_version,summary,references\r\n"
        );
    }

    #[test]
    fn test_row_layout() {
        let mut result = ScanResult::empty("repo");
        result.vulnerabilities.push(vuln("PYSEC-1", "SQL injection"));

        let csv = export_csv(&result);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "PYSEC-1,CRITICAL,9.8,PyPI,django,2.2.0,,SQL injection,https://a.example https://b.example"
        );
    }

    #[test]
    fn test_quotes_special_characters() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a, b"), "\"a, b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }
}
