//! Built-in viewer: the MJPEG feed plus a live readout of `landmarks_data`.

pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Landmark Stream</title>
  <style>
    :root { color-scheme: dark; }
    body { margin: 0; font-family: ui-monospace, SFMono-Regular, Menlo, monospace; background: #0b0f14; color: #d8e1ea; }
    main { display: grid; grid-template-columns: minmax(0, 3fr) minmax(260px, 1fr); gap: 16px; padding: 16px; }
    .feed { position: relative; }
    .feed img, .feed canvas { width: 100%; display: block; border-radius: 6px; }
    .feed canvas { position: absolute; inset: 0; pointer-events: none; }
    aside { background: #121922; border-radius: 6px; padding: 12px 16px; }
    dt { color: #7f8fa3; font-size: 12px; text-transform: uppercase; margin-top: 12px; }
    dd { margin: 4px 0 0; font-size: 20px; }
    #status.live { color: #4ade80; }
    #status.down { color: #f87171; }
    @media (max-width: 800px) { main { grid-template-columns: 1fr; } }
  </style>
</head>
<body>
  <main>
    <div class="feed">
      <img id="video" src="/video" alt="annotated camera feed" />
      <canvas id="overlay"></canvas>
    </div>
    <aside>
      <dl>
        <dt>Connection</dt><dd id="status" class="down">connecting</dd>
        <dt>Frame</dt><dd id="frame">-</dd>
        <dt>Mouth</dt><dd id="mouth">-</dd>
        <dt>Gesture</dt><dd id="gesture">-</dd>
        <dt>Face points</dt><dd id="face-count">0</dd>
        <dt>Hand points</dt><dd id="hand-count">0</dd>
      </dl>
      <label><input type="checkbox" id="show-overlay" /> client-side overlay</label>
    </aside>
  </main>
  <script>
    const $ = (id) => document.getElementById(id);
    const video = $("video");
    const canvas = $("overlay");
    const ctx = canvas.getContext("2d");
    const colors = { Left: "#ef4444", Right: "#3b82f6" };

    function drawOverlay(data) {
      canvas.width = video.naturalWidth || 640;
      canvas.height = video.naturalHeight || 360;
      ctx.clearRect(0, 0, canvas.width, canvas.height);
      if (!$("show-overlay").checked) return;
      ctx.fillStyle = "#22c55e";
      for (const p of data.face) ctx.fillRect(p.x, p.y, 1, 1);
      for (const p of data.hands) {
        ctx.fillStyle = colors[p.type] || "#ffffff";
        ctx.fillRect(p.x - 2, p.y - 2, 5, 5);
      }
    }

    const events = new EventSource("/events");
    events.onopen = () => { $("status").textContent = "live"; $("status").className = "live"; };
    events.onerror = () => { $("status").textContent = "disconnected"; $("status").className = "down"; };
    events.addEventListener("landmarks_data", (event) => {
      const data = JSON.parse(event.data);
      $("frame").textContent = event.lastEventId || "-";
      $("mouth").textContent = data.mouth;
      $("gesture").textContent = data.gesture;
      $("face-count").textContent = data.face.length;
      $("hand-count").textContent = data.hands.length;
      drawOverlay(data);
    });
  </script>
</body>
</html>
"##;
