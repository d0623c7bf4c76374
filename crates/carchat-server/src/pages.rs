use include_dir::{include_dir, Dir};
use serde::Serialize;
use tera::{Context, Tera};

static TEMPLATES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// HTML pages compiled once from the templates embedded in the binary
pub struct Pages {
    tera: Tera,
}

impl Pages {
    pub fn new() -> Result<Self, tera::Error> {
        let templates: Vec<(&str, &str)> = TEMPLATES
            .files()
            .filter_map(|file| Some((file.path().to_str()?, file.contents_utf8()?)))
            .collect();

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)?;
        Ok(Self { tera })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, tera::Error> {
        let context = Context::from_serialize(data)?;
        self.tera.render(name, &context)
    }
}
