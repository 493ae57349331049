//! Static pages served by the relay.

/// Laptop-side operator view: QR code, live stream, status and activity log.
pub const OPERATOR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Exam Proctor - Side Camera</title>
<style>
  body { font-family: sans-serif; background: #f4f5f7; margin: 0; padding: 24px; }
  .panel { background: #fff; border-radius: 8px; padding: 16px; margin-bottom: 16px; }
  #stream { max-width: 100%; border: 1px solid #ccc; }
  #status { font-weight: bold; }
  .connected { color: #1b7f3a; }
  .waiting { color: #8a6d00; }
  table { border-collapse: collapse; }
  td { padding: 2px 12px 2px 0; }
</style>
</head>
<body>
<div class="panel">
  <h2>Scan with the exam phone</h2>
  <img src="/qr" alt="phone link">
</div>
<div class="panel">
  <h2>Side view</h2>
  <img id="stream" src="/stream" alt="live side view">
  <p id="status" class="waiting">Waiting for phone connection...</p>
</div>
<div class="panel">
  <h2>Activity log</h2>
  <table id="activity"></table>
</div>
<script>
function refresh() {
  fetch('/status').then(r => r.json()).then(s => {
    const el = document.getElementById('status');
    if (s.connected) {
      el.textContent = '✓ Phone Connected | ' + s.suspicious;
      el.className = 'connected';
    } else {
      el.textContent = s.suspicious || 'Waiting for phone connection...';
      el.className = 'waiting';
    }
    const rows = Object.entries(s.activity_log)
      .map(([k, v]) => '<tr><td>' + k.replace(/_/g, ' ') + '</td><td>' + v + '</td></tr>');
    document.getElementById('activity').innerHTML = rows.join('');
  }).catch(() => {});
}
setInterval(refresh, 2000);
refresh();
</script>
</body>
</html>
"#;

/// Phone-side page: streams the rear camera to `/upload` and shows alerts.
pub const PHONE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Exam Proctor - Phone Camera</title>
<style>
  body { font-family: sans-serif; margin: 0; padding: 12px; background: #111; color: #eee; }
  video { width: 100%; border-radius: 6px; }
  #alert { display: none; background: #c62828; color: #fff; padding: 12px;
           border-radius: 6px; margin-top: 12px; font-weight: bold; }
  #state { margin-top: 8px; font-size: 14px; }
</style>
</head>
<body>
<video id="camera" autoplay playsinline muted></video>
<canvas id="canvas" style="display:none"></canvas>
<div id="state">Starting camera...</div>
<div id="alert"></div>
<script>
const video = document.getElementById('camera');
const canvas = document.getElementById('canvas');
const state = document.getElementById('state');
const alertBox = document.getElementById('alert');

navigator.mediaDevices.getUserMedia({ video: { facingMode: 'environment' }, audio: false })
  .then(stream => {
    video.srcObject = stream;
    state.textContent = 'Camera active - sending frames';
    setInterval(sendFrame, 1000);
  })
  .catch(err => { state.textContent = 'Camera error: ' + err; });

function sendFrame() {
  if (!video.videoWidth) return;
  canvas.width = video.videoWidth;
  canvas.height = video.videoHeight;
  canvas.getContext('2d').drawImage(video, 0, 0);
  canvas.toBlob(blob => {
    if (!blob) return;
    const form = new FormData();
    form.append('frame', blob, 'frame.jpg');
    fetch('/upload', { method: 'POST', body: form }).catch(() => {
      state.textContent = 'Upload failed - retrying';
    });
  }, 'image/jpeg', 0.5);
}

function pollAlerts() {
  fetch('/get_alerts').then(r => r.json()).then(a => {
    if (!a.alert) return;
    alertBox.textContent = a.alert;
    alertBox.style.display = 'block';
    if (navigator.vibrate) navigator.vibrate([200, 100, 200]);
    setTimeout(() => { alertBox.style.display = 'none'; }, 5000);
  }).catch(() => {});
}
setInterval(pollAlerts, 2000);
</script>
</body>
</html>
"#;
