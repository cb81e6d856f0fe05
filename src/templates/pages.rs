use askama::Template;

use super::{Renderer, TemplateData};

pub const HOME: &str = "home.html";
pub const VIEW: &str = "view.html";
pub const CREATE: &str = "create.html";
pub const SIGNUP: &str = "signup.html";
pub const LOGIN: &str = "login.html";

#[derive(Template)]
#[template(path = "pages/home.html")]
struct HomePage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/view.html")]
struct ViewPage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/create.html")]
struct CreatePage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
struct SignupPage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
struct LoginPage<'a> {
    data: &'a TemplateData,
}

macro_rules! renderer {
    ($page:ident) => {{
        fn render(data: &TemplateData, buf: &mut String) -> askama::Result<()> {
            $page { data }.render_into(buf)
        }
        render as Renderer
    }};
}

pub(super) fn all() -> [(&'static str, Renderer); 5] {
    [
        (HOME, renderer!(HomePage)),
        (VIEW, renderer!(ViewPage)),
        (CREATE, renderer!(CreatePage)),
        (SIGNUP, renderer!(SignupPage)),
        (LOGIN, renderer!(LoginPage)),
    ]
}
