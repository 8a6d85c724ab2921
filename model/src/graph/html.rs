//! A self-contained HTML page showing a graph with force-graph.

use super::{Graph, Style};
use anyhow::Error;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{{TITLE}}</title>
  <style>
    body { margin: 0; font-family: sans-serif; }
    #legend {
      position: absolute; top: 12px; left: 12px; z-index: 10;
      padding: 8px 12px; background: rgba(255, 255, 255, 0.85); border-radius: 4px;
      font-size: 13px; max-width: 40em;
    }
  </style>
  <script src="{{LIBRARY}}"></script>
</head>
<body>
  <div id="legend"><strong>{{TITLE}}</strong><br>{{NODES}} rows, {{LINKS}} links. Hover a node to see its answers.</div>
  <div id="graph"></div>
  <script>
    const data = {{DATA}};
    const escape = (s) => s
      .replace(/&/g, "&amp;")
      .replace(/</g, "&lt;")
      .replace(/>/g, "&gt;")
      .replace(/\n/g, "<br>");
    {{CONSTRUCTOR}}(document.getElementById("graph"))
      .graphData(data)
      .nodeId("id")
      .nodeLabel((node) => `<div style="max-width: 40em">${escape(node.text)}</div>`)
      .nodeAutoColorBy("group")
      .linkWidth((link) => link.value)
      .linkColor(() => "rgba(120, 120, 120, 0.35)");
  </script>
</body>
</html>
"#;

impl Style {
    /// Script providing the graph component for this style.
    pub fn library_url(&self) -> &'static str {
        match self {
            Self::TwoD => "https://unpkg.com/force-graph",
            Self::ThreeD => "https://unpkg.com/3d-force-graph",
        }
    }

    /// Expression constructing the graph component.
    fn constructor(&self) -> &'static str {
        match self {
            Self::TwoD => "ForceGraph()",
            Self::ThreeD => "ForceGraph3D()",
        }
    }
}

/// Render `graph` as a standalone page.
pub fn render_html(graph: &Graph, style: Style, title: &str) -> Result<String, Error> {
    // `</script>` inside the data would end the script element early.
    let data = serde_json::to_string(graph)?.replace("</", "<\\/");
    Ok(TEMPLATE
        .replace("{{TITLE}}", &escape_html(title))
        .replace("{{LIBRARY}}", style.library_url())
        .replace("{{CONSTRUCTOR}}", style.constructor())
        .replace("{{NODES}}", &graph.nodes.len().to_string())
        .replace("{{LINKS}}", &graph.links.len().to_string())
        .replace("{{DATA}}", &data))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
