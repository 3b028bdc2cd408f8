//! HTML-страницы: форма загрузки и сводка результатов

use crate::error::PredictionError;
use crate::models::{format_currency, PredictionStats};
use crate::store::ResultToken;
use crate::types::RecordSet;

/// Данные для страницы результатов
pub struct ResultsView<'a> {
    pub token: ResultToken,
    pub stats: &'a PredictionStats,
    pub rows_dropped: usize,
    /// Первые строки полной таблицы
    pub preview: RecordSet,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Сообщение для пользователя; тип ошибки остается в `data-kind`
pub fn user_message(err: &PredictionError) -> String {
    match err {
        PredictionError::MissingFile => "No se seleccionó ningún archivo".to_string(),
        PredictionError::NoResultAvailable(_) => "No hay resultados para descargar".to_string(),
        other => format!("Error procesando el archivo: {}", other),
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<main class="container">
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

pub fn index_page(error: Option<&PredictionError>) -> String {
    let alert = match error {
        Some(err) => format!(
            r#"<div class="alert alert-danger" data-kind="{}">{}</div>
"#,
            err.kind(),
            escape(&user_message(err))
        ),
        None => String::new(),
    };

    let body = format!(
        r#"<h1>Predicción de precios de casas</h1>
{alert}<form action="/predict" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept=".csv">
<button type="submit">Predecir</button>
</form>"#,
        alert = alert
    );
    layout("Predicción de precios de casas", &body)
}

fn table_html(records: &RecordSet) -> String {
    let mut html = String::from("<table class=\"table table-striped table-hover\">\n<thead><tr>");
    for column in &records.columns {
        html.push_str(&format!("<th>{}</th>", escape(column)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &records.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", escape(&cell.to_field())));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

pub fn results_page(view: &ResultsView<'_>) -> String {
    let stats = view.stats;
    let body = format!(
        r#"<h1>Resultados</h1>
<ul class="stats">
<li>total_registros: <span id="total_registros">{total}</span></li>
<li>filas_descartadas: <span id="filas_descartadas">{dropped}</span></li>
<li>precio_promedio: <span id="precio_promedio">{average}</span></li>
<li>precio_minimo: <span id="precio_minimo">{minimum}</span></li>
<li>precio_maximo: <span id="precio_maximo">{maximum}</span></li>
</ul>
<p>Mostrando {shown} de {total} filas.</p>
{table}
<p><a id="download" href="/download/{token}">Descargar CSV</a></p>
<p><a href="/">Nueva predicción</a></p>"#,
        total = stats.total,
        dropped = view.rows_dropped,
        average = format_currency(stats.average),
        minimum = format_currency(stats.minimum),
        maximum = format_currency(stats.maximum),
        shown = view.preview.len(),
        table = table_html(&view.preview),
        token = view.token,
    );
    layout("Resultados de la predicción", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_index_page_shows_error_kind() {
        let err = PredictionError::MissingColumns {
            missing: vec!["LotArea".to_string()],
        };
        let html = index_page(Some(&err));
        assert!(html.contains(r#"data-kind="missing_columns""#));
        assert!(html.contains("LotArea"));
        assert!(!index_page(None).contains("alert"));
    }

    #[test]
    fn test_results_page() {
        let preview = RecordSet::from_rows(
            vec!["MSSubClass".to_string(), "Precio_Predicho_USD".to_string()],
            vec![vec![
                CellValue::Text("60".to_string()),
                CellValue::Number(208500.0),
            ]],
        )
        .unwrap();
        let stats = PredictionStats::from_values(&[208500.0]);
        let token = ResultToken::new();

        let html = results_page(&ResultsView {
            token,
            stats: &stats,
            rows_dropped: 2,
            preview,
        });

        assert!(html.contains(r#"<span id="total_registros">1</span>"#));
        assert!(html.contains(r#"<span id="filas_descartadas">2</span>"#));
        assert!(html.contains("$208,500.00"));
        assert!(html.contains(&format!("/download/{}", token)));
        assert!(html.contains("<th>MSSubClass</th><th>Precio_Predicho_USD</th>"));
    }
}
