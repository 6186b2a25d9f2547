//! Minimal HTML for the listing page and the login form.

use std::fmt::Write as _;

use crate::catalog::{Book, FilterCategory, SortColumn};

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

/// The catalog listing shown at `/`.
pub fn render_index(books: &[Book], filter: FilterCategory, sort: SortColumn, user: &str) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<p id=\"user\">{} <a href=\"/logout\">Log out</a></p>", escape(user));
    let _ = writeln!(body, "<form id=\"search-form\" method=\"post\" action=\"/search\"><input name=\"search\"><input type=\"submit\" value=\"Search\"></form>");
    let _ = write!(body, "<p id=\"filters\">");
    for f in [FilterCategory::All, FilterCategory::Fiction, FilterCategory::NonFiction] {
        let class = if f == filter { " class=\"active\"" } else { "" };
        let _ = write!(body, "<a{} href=\"/?filter={}\">{}</a> ", class, f.as_str(), f.as_str());
    }
    let _ = writeln!(body, "</p>");
    let _ = writeln!(body, "<table id=\"view-results\" data-sort=\"{}\" data-filter=\"{}\">", sort.as_str(), filter.as_str());
    let _ = write!(body, "<tr>");
    for col in SortColumn::ALL {
        let _ = write!(body, "<th><a href=\"/?sortBy={}\">{}</a></th>", col.as_str(), col.as_str());
    }
    let _ = writeln!(body, "</tr>");
    for b in books {
        let _ = writeln!(
            body,
            "<tr id=\"book-row-{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            b.pk,
            b.pk,
            escape(&b.title),
            escape(&b.author),
            escape(&b.classification)
        );
    }
    let _ = writeln!(body, "</table>");
    layout("Bookshelf", &body)
}

/// The login/registration form, optionally with an error line.
pub fn render_login(error: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(e) = error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", escape(e));
    }
    let _ = writeln!(
        body,
        "<form method=\"post\" action=\"/login\">\n<input name=\"username\" placeholder=\"Username\">\n<input name=\"password\" type=\"password\" placeholder=\"Password\">\n<input type=\"submit\" name=\"login\" value=\"Log in\">\n<input type=\"submit\" name=\"register\" value=\"Register\">\n</form>"
    );
    layout("Bookshelf login", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_escapes_book_fields() {
        let books = vec![Book {
            pk: 3,
            title: "<script>alert(1)</script>".into(),
            author: "O'Brien & Co".into(),
            classification: "813".into(),
            external_id: "OW3".into(),
        }];
        let html = render_index(&books, FilterCategory::Fiction, SortColumn::Title, "alice");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("O&#39;Brien &amp; Co"));
        assert!(html.contains("data-filter=\"fiction\""));
        assert!(html.contains("data-sort=\"title\""));
        assert!(html.contains("book-row-3"));
    }

    #[test]
    fn login_shows_error_only_when_given() {
        assert!(!render_login(None).contains("class=\"error\""));
        assert!(render_login(Some("Username already exists")).contains("Username already exists"));
    }
}
