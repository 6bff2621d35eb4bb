//! HTML views served by the auth endpoints.
//!
//! # Design Decisions
//! - Built-in markup for every view, so the gateway runs with no assets
//! - `<pages_dir>/<view>.html` replaces a built-in view, read once at startup
//! - `{{site_key}}` and `{{notice}}` are the only substitutions

use std::collections::HashMap;
use std::path::Path;

use axum::response::Html;

/// Named views the handlers can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Login,
    LoginSuccess,
    AlreadyLoggedIn,
    Register,
    RegisterSuccess,
    Logout,
    Menu,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Login,
        View::LoginSuccess,
        View::AlreadyLoggedIn,
        View::Register,
        View::RegisterSuccess,
        View::Logout,
        View::Menu,
    ];

    /// File stem used for directory overrides.
    pub fn name(self) -> &'static str {
        match self {
            View::Login => "login",
            View::LoginSuccess => "login-success",
            View::AlreadyLoggedIn => "already-logged-in",
            View::Register => "register",
            View::RegisterSuccess => "register-success",
            View::Logout => "logout",
            View::Menu => "menu",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            View::Login => LOGIN,
            View::LoginSuccess => LOGIN_SUCCESS,
            View::AlreadyLoggedIn => ALREADY_LOGGED_IN,
            View::Register => REGISTER,
            View::RegisterSuccess => REGISTER_SUCCESS,
            View::Logout => LOGOUT,
            View::Menu => MENU,
        }
    }
}

/// Page renderer.
#[derive(Debug, Clone, Default)]
pub struct Pages {
    overrides: HashMap<View, String>,
    site_key: String,
}

impl Pages {
    pub fn new(site_key: impl Into<String>) -> Self {
        Self {
            overrides: HashMap::new(),
            site_key: site_key.into(),
        }
    }

    /// Load overrides from `dir`. Missing files keep the built-in view.
    pub fn with_overrides(mut self, dir: &Path) -> std::io::Result<Self> {
        for view in View::ALL {
            let path = dir.join(format!("{}.html", view.name()));
            match std::fs::read_to_string(&path) {
                Ok(body) => {
                    tracing::info!(view = view.name(), path = %path.display(), "Loaded page override");
                    self.overrides.insert(view, body);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self)
    }

    pub fn render(&self, view: View) -> Html<String> {
        self.render_with_notice(view, "")
    }

    /// Render `view` with a short message shown above the form.
    pub fn render_with_notice(&self, view: View, notice: &str) -> Html<String> {
        let template = self
            .overrides
            .get(&view)
            .map(String::as_str)
            .unwrap_or_else(|| view.builtin());
        let notice = if notice.is_empty() {
            String::new()
        } else {
            format!("<p class=\"notice\">{}</p>", escape(notice))
        };
        Html(
            template
                .replace("{{site_key}}", &escape(&self.site_key))
                .replace("{{notice}}", &notice),
        )
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const LOGIN: &str = r#"<html>
<head>
	<title>AuthProx - Login</title>
</head>

<body>
	<h1>AuthProx Login</h1>
	{{notice}}
	<form method="POST" action="/proxy/login">
		<input type="text" name="username" placeholder="Username">
		<input type="password" name="password" placeholder="Password">
		<input type="submit" value="Login">
	</form>
	<a href="/proxy/register">Create an account</a>
</body>
</html>"#;

const LOGIN_SUCCESS: &str = r#"<html>
<head>
	<title>AuthProx - Login</title>
</head>

<body>
	<h1>AuthProx Login</h1>
	You have successfully logged in.
	<a href="/">Continue</a>
</body>
</html>"#;

const ALREADY_LOGGED_IN: &str = r#"<html>
<head>
	<title>AuthProx - Already Logged in</title>
</head>

<body>
	<h1>Already Logged in</h1>
	You are already logged in!
	<a href="/">Continue</a>
</body>
</html>"#;

const REGISTER: &str = r#"<html>
<head>
	<title>AuthProx - Register</title>
	<script src="https://www.google.com/recaptcha/api.js"></script>
</head>

<body>
	<h1>AuthProx Registration</h1>
	{{notice}}
	<form method="POST" action="/proxy/register">
		<input type="text" name="username" placeholder="Username">
		<input type="password" name="password" placeholder="Password">
		<div class="g-recaptcha" data-sitekey="{{site_key}}"></div>
		<input type="submit" value="Register">
	</form>
</body>
</html>"#;

const REGISTER_SUCCESS: &str = r#"<html>
<head>
	<title>AuthProx - Register</title>
</head>

<body>
	<h1>AuthProx Registration</h1>
	You have successfully registered your new account.
	<a href="/proxy/login">Continue to login page</a>
</body>
</html>"#;

const LOGOUT: &str = r#"<html>
<head>
	<title>AuthProx - Logout</title>
</head>

<body>
	<h1>AuthProx Logout</h1>
	You have been logged out.
	<a href="/proxy/login">Login again</a>
</body>
</html>"#;

const MENU: &str = r#"<html>
<head>
	<title>AuthProx</title>
</head>

<body>
	<h1>AuthProx</h1>
	<ul>
		<li><a href="/">Application</a></li>
		<li><a href="/proxy/login">Login</a></li>
		<li><a href="/proxy/register">Register</a></li>
		<li><a href="/proxy/logout">Logout</a></li>
	</ul>
</body>
</html>"#;
