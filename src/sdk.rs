/// Embedded browser widget, served when `assets/chat-widget.js` is absent.
pub fn widget_script() -> String {
    r#"// Greentic chat widget
(function(global) {
  const version = "0.1.0";
  const api = "/api/widget";
  let session = null;
  let config = null;
  let root = null;

  async function call(method, path, body, isForm) {
    const opts = { method, headers: {}, credentials: "same-origin" };
    if (session) opts.headers["x-chat-widget-session"] = session;
    if (body !== undefined) {
      if (isForm) {
        opts.body = body;
      } else {
        opts.headers["Content-Type"] = "application/json";
        opts.body = JSON.stringify(body);
      }
    }
    const res = await fetch(api + path, opts);
    const text = await res.text();
    const data = text ? JSON.parse(text) : null;
    if (!res.ok) {
      const err = new Error((data && data.alert) || text || res.statusText);
      err.status = res.status;
      throw err;
    }
    return data;
  }

  function escapeHtml(text, keepBreaks) {
    const div = document.createElement("div");
    div.textContent = text;
    return keepBreaks ? div.innerHTML.replace(/&lt;br&gt;/g, "<br>") : div.innerHTML;
  }

  function render(view) {
    if (!root || !view) return;
    root.classList.toggle("open", view.popup_open);
    const list = root.querySelector(".chat-messages");
    list.innerHTML = view.messages
      .map(m =>
        `<div class="msg-bubble ${m.sender}${m.is_error ? " error" : ""}">` +
        `<span class="msg-text">${escapeHtml(m.text, m.sender === "bot")}</span>` +
        `<span class="msg-time">${m.time}</span></div>`)
      .join("");
    if (view.is_loading) list.innerHTML += '<div class="msg-bubble bot typing">…</div>';
    list.scrollTop = list.scrollHeight;
    root.querySelector(".chat-auth").hidden = !view.auth_prompt_visible;
    root.querySelector(".chat-auth-file").textContent = view.pending_filename || "";
  }

  // Draws the user's bubble and the typing indicator before the server
  // answers; the next render replaces them with the session view.
  function appendLocal(text) {
    const list = root.querySelector(".chat-messages");
    if (text) {
      list.insertAdjacentHTML("beforeend",
        `<div class="msg-bubble user pending"><span class="msg-text">${escapeHtml(text, false)}</span></div>`);
    }
    list.insertAdjacentHTML("beforeend", '<div class="msg-bubble bot typing">…</div>');
    list.scrollTop = list.scrollHeight;
  }

  function build() {
    root = document.createElement("div");
    root.className = "greentic-chat-widget";
    const upload = config.features.uploads
      ? `<label class="chat-upload-btn">📎<input type="file" accept="${config.accept}" hidden></label>`
      : "";
    root.innerHTML = `
      <button class="chat-toggle-btn" type="button">💬</button>
      <div class="chat-wrapper">
        <div class="chat-header"><h3></h3><button class="close-btn" type="button">×</button></div>
        <div class="chat-body"><div class="chat-messages"></div></div>
        <form class="chat-auth" hidden>
          <p>Sign in to upload <span class="chat-auth-file"></span></p>
          <input name="user_id" placeholder="User ID" autocomplete="off">
          <input name="password" type="password" placeholder="Password">
          <button type="submit">Upload</button>
          <button type="button" class="chat-auth-cancel">Cancel</button>
        </form>
        <div class="chat-input-bar">
          ${upload}
          <input type="text" class="chat-input" placeholder="Type your message...">
          <button class="chat-send-btn" type="button">➤</button>
        </div>
      </div>`;
    root.querySelector(".chat-header h3").textContent = config.title;
    document.body.appendChild(root);

    const input = root.querySelector(".chat-input");
    const send = async () => {
      const text = input.value;
      if (!text.trim()) return;
      input.value = "";
      appendLocal(text);
      try {
        render(await call("POST", "/message", { text }));
      } catch (err) {
        console.warn("chat widget: send failed", err);
        await refresh();
      }
    };
    root.querySelector(".chat-toggle-btn").onclick = () => call("POST", "/popup/toggle").then(render);
    root.querySelector(".close-btn").onclick = () => call("POST", "/popup/close").then(render);
    root.querySelector(".chat-send-btn").onclick = send;
    input.addEventListener("keydown", e => { if (e.key === "Enter") send(); });
    input.addEventListener("change", () => call("POST", "/input", { text: input.value }));

    const file = root.querySelector('input[type="file"]');
    if (file) {
      file.addEventListener("change", async () => {
        const chosen = file.files[0];
        file.value = "";
        if (!chosen) return;
        if (chosen.type !== config.accept) {
          alert("Please select a PDF file.");
          return;
        }
        const form = new FormData();
        form.append("file", chosen, chosen.name);
        if (!config.features.auth_gate) appendLocal("📄 Uploading " + chosen.name);
        try {
          render(await call("POST", "/file", form, true));
        } catch (err) {
          alert(err.message);
          await refresh();
        }
      });
    }

    const auth = root.querySelector(".chat-auth");
    auth.addEventListener("submit", async e => {
      e.preventDefault();
      const body = { user_id: auth.user_id.value, password: auth.password.value };
      auth.reset();
      auth.hidden = true;
      appendLocal(null);
      try {
        render(await call("POST", "/auth", body));
      } catch (err) {
        console.warn("chat widget: upload failed", err);
        await refresh();
      }
    });
    root.querySelector(".chat-auth-cancel").onclick = () => {
      auth.reset();
      call("POST", "/auth/cancel").then(render);
    };
  }

  async function refresh() {
    render(await call("GET", "/session"));
  }

  async function init(opts = {}) {
    config = await call("GET", "/config");
    if (opts.title) config.title = opts.title;
    const mounted = await call("POST", "/session");
    session = mounted.session_id;
    build();
    render(mounted.view);
    global.addEventListener("pagehide", () => {
      fetch(api + "/session", {
        method: "DELETE",
        headers: { "x-chat-widget-session": session },
        keepalive: true,
      });
    });
    return session;
  }

  async function sendEvent({ eventType, metadata = {} }) {
    try {
      await call("POST", "/events", {
        event_type: eventType,
        path: global.location.pathname,
        metadata,
      });
    } catch (err) {
      console.warn("chat widget: failed to send event", err);
    }
  }

  global.GreenticChatWidget = { version, init, refresh, sendEvent };
})(window);
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_targets_widget_api() {
        let script = widget_script();
        assert!(script.contains("/api/widget"));
        assert!(script.contains("x-chat-widget-session"));
        assert!(script.contains("GreenticChatWidget"));
    }

    #[test]
    fn sent_text_is_drawn_before_the_request() {
        let script = widget_script();
        let local = script.find("appendLocal(text);").expect("local bubble");
        let request = script
            .find(r#"call("POST", "/message""#)
            .expect("message request");
        assert!(local < request);
    }
}
