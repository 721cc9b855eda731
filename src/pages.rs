//! Inline HTML for the browser side.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::catalog::DownloadFile;

const STYLE: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body { max-width: 800px; margin: 2rem auto; padding: 0 1rem; font-family: sans-serif; }
    h1 { text-align: center; margin-bottom: 2rem; font-size: 24px; }
    .upload-container { border: 2px dashed #ccc; padding: 3rem 2rem; text-align: center; border-radius: 8px; margin-bottom: 2rem; }
    #file-input { display: none; }
    .select-btn, .upload-btn { padding: 1.2rem 3rem; border: none; border-radius: 8px; color: white; cursor: pointer; margin: 0.8rem; font-size: 18px; font-weight: bold; min-width: 200px; }
    .select-btn { background: #4285f4; }
    .upload-btn { background: #0f9d58; }
    .progress-item { margin: 1rem 0; padding: 1rem; border: 1px solid #eee; border-radius: 4px; word-break: break-all; }
    .progress-bar { height: 20px; background: #eee; border-radius: 10px; overflow: hidden; margin-top: 0.5rem; }
    .progress-fill { height: 100%; background: #4285f4; width: 0%; transition: width 0.3s ease; }
    .file-list { margin-top: 2rem; border: 1px solid #eee; border-radius: 8px; overflow: hidden; }
    .file-row { display: flex; border-bottom: 1px solid #eee; align-items: center; }
    .file-row:last-child { border-bottom: none; }
    .file-row.header { background: #4285f4; color: white; font-weight: bold; }
    .col-name { flex: 1; padding: 1.2rem 1rem; word-break: break-all; }
    .col-size { width: 110px; padding: 1.2rem 1rem; text-align: center; white-space: nowrap; }
    .col-op { width: 110px; padding: 1.2rem 1rem; text-align: center; }
    .download-btn { display: inline-block; background: #4285f4; color: white; padding: 0.8rem 1.2rem; text-decoration: none; border-radius: 6px; }
    .empty-tip { padding: 2rem; text-align: center; color: #999; }
    .nav-link { margin-top: 2rem; text-align: center; }
    .nav-link a { color: #4285f4; text-decoration: none; padding: 0.8rem 1.5rem; border: 1px solid #4285f4; border-radius: 4px; }
"#;

// the page sends one POST per file, each with its own upload id
const UPLOAD_SCRIPT: &str = r#"
    let files = [];
    const fileInput = document.getElementById('file-input');
    const uploadBtn = document.getElementById('upload-btn');
    const fileList = document.getElementById('file-list');

    fileInput.addEventListener('change', function (e) {
        files = Array.from(e.target.files);
        if (files.length === 0) return;
        uploadBtn.style.display = 'inline-block';
        fileList.innerHTML = '';
        files.forEach(function (file, index) {
            const item = document.createElement('div');
            item.className = 'progress-item';
            const label = document.createElement('div');
            label.textContent = file.name + ' (' + formatSize(file.size) + ')';
            item.appendChild(label);
            item.insertAdjacentHTML('beforeend',
                '<div class="progress-bar"><div class="progress-fill" id="progress-' + index + '"></div></div>' +
                '<div id="progress-text-' + index + '">0%</div>');
            fileList.appendChild(item);
        });
    });

    function formatSize(bytes) {
        if (bytes < 1024) return bytes + ' B';
        if (bytes < 1048576) return (bytes / 1024).toFixed(1) + ' KB';
        return (bytes / 1048576).toFixed(1) + ' MB';
    }

    function newUploadId() {
        if (window.crypto && crypto.randomUUID) return crypto.randomUUID();
        return Date.now().toString(36) + Math.random().toString(36).substring(2, 15);
    }

    function uploadFiles() {
        files.forEach(function (file, index) {
            const formData = new FormData();
            formData.append('file', file);
            const xhr = new XMLHttpRequest();
            xhr.open('POST', '/upload?uploadId=' + encodeURIComponent(newUploadId()) + '&size=' + file.size, true);
            xhr.upload.addEventListener('progress', function (e) {
                if (e.lengthComputable) updateProgress(index, (e.loaded / e.total) * 100);
            });
            xhr.onload = function () {
                if (xhr.status === 200) updateProgress(index, 100, 'Done');
                else updateProgress(index, 0, 'Failed (' + xhr.status + ')');
            };
            xhr.onerror = function () { updateProgress(index, 0, 'Failed (network error)'); };
            xhr.send(formData);
        });
        uploadBtn.style.display = 'none';
        fileInput.value = '';
    }

    function updateProgress(index, percent, text) {
        const fill = document.getElementById('progress-' + index);
        const textEl = document.getElementById('progress-text-' + index);
        fill.style.width = percent + '%';
        textEl.textContent = text || Math.round(percent) + '%';
        if (text && text.indexOf('Failed') === 0) fill.style.backgroundColor = '#ea4335';
        if (text === 'Done') fill.style.backgroundColor = '#0f9d58';
    }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
{body}
</body>
</html>
"#
    )
}

/// upload page with multi-file selection and per-file progress bars
pub fn upload_page() -> String {
    let body = format!(
        r#"    <h1>Upload files</h1>
    <div class="upload-container">
        <button class="select-btn" onclick="document.getElementById('file-input').click()">Choose files</button>
        <input type="file" id="file-input" multiple>
        <button class="upload-btn" id="upload-btn" onclick="uploadFiles()" style="display:none;">Start upload</button>
    </div>
    <div id="file-list"></div>
    <div class="nav-link"><a href="/download-page">Go to downloads</a></div>
    <script>{UPLOAD_SCRIPT}</script>"#
    );
    layout("Upload files", &body)
}

/// download list; an empty catalog gets an explicit notice instead of rows
pub fn download_page(files: &[DownloadFile]) -> String {
    let mut rows = String::new();
    if files.is_empty() {
        rows.push_str(r#"        <div class="empty-tip">Nothing to download yet</div>"#);
        rows.push('\n');
    }
    for file in files {
        let name = html_escape::encode_text(&file.name);
        let href = utf8_percent_encode(&file.name, NON_ALPHANUMERIC);
        rows.push_str(&format!(
            r#"        <div class="file-row">
            <div class="col-name">{name}</div>
            <div class="col-size">{size}</div>
            <div class="col-op"><a href="/download?file={href}" class="download-btn" download>Download</a></div>
        </div>
"#,
            size = file.size_kb,
        ));
    }

    let body = format!(
        r#"    <h1>Downloads</h1>
    <div class="file-list">
        <div class="file-row header">
            <div class="col-name">File</div>
            <div class="col-size">Size (KB)</div>
            <div class="col-op">Action</div>
        </div>
{rows}    </div>
    <div class="nav-link"><a href="/">Go to upload</a></div>"#
    );
    layout("Downloads", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(name: &str) -> DownloadFile {
        DownloadFile {
            name: name.to_string(),
            path: PathBuf::from("/tmp").join(name),
            size: 2048,
            size_kb: 2,
            modified: "Unknown".to_string(),
        }
    }

    #[test]
    fn empty_catalog_shows_notice() {
        let page = download_page(&[]);
        assert!(page.contains("Nothing to download yet"));
        assert!(!page.contains("download-btn\""));
    }

    #[test]
    fn names_are_escaped_and_links_encoded() {
        let page = download_page(&[entry("a <b>&c.txt")]);
        assert!(page.contains("a &lt;b&gt;&amp;c.txt"));
        assert!(page.contains("/download?file=a%20%3Cb%3E%26c%2Etxt"));
        assert!(!page.contains("Nothing to download yet"));
    }
}
