//! Display language shared by the server and the client modules.
//!
//! Everything that differs between the English and the Brazilian Portuguese
//! front ends (route prefixes, labels, notification texts, catalog language)
//! hangs off [`Locale`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en", alias = "en-US", alias = "en_US")]
    En,
    #[serde(rename = "pt-BR", alias = "ptbr", alias = "pt", alias = "pt_BR", alias = "pt-br")]
    PtBr,
}

impl Locale {
    /// Lenient parse of a language tag; unknown tags fall back to English.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "pt-br" | "pt_br" | "ptbr" | "pt" => Locale::PtBr,
            _ => Locale::En,
        }
    }

    /// Tag stored in `users.language` and sent as the `language` query parameter.
    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::PtBr => "pt-BR",
        }
    }

    /// Language parameter understood by the external catalog.
    pub fn catalog_language(self) -> &'static str {
        match self {
            Locale::En => "en-US",
            Locale::PtBr => "pt-BR",
        }
    }

    fn route_prefix(self) -> &'static str {
        match self {
            Locale::En => "",
            Locale::PtBr => "/ptbr",
        }
    }

    pub fn user_link(self, username: &str) -> String {
        format!("{}/profile/{}", self.route_prefix(), username)
    }

    pub fn movie_link(self, id: &str) -> String {
        match self {
            Locale::En => format!("/movie/{id}"),
            Locale::PtBr => format!("{}/filme/{id}", self.route_prefix()),
        }
    }

    pub fn tv_link(self, id: &str) -> String {
        match self {
            Locale::En => format!("/tv/{id}"),
            Locale::PtBr => format!("{}/serie/{id}", self.route_prefix()),
        }
    }

    pub fn user_label(self) -> &'static str {
        match self {
            Locale::En => "User",
            Locale::PtBr => "Usuário",
        }
    }

    pub fn movie_label(self) -> &'static str {
        match self {
            Locale::En => "Movie",
            Locale::PtBr => "Filme",
        }
    }

    pub fn tv_label(self) -> &'static str {
        match self {
            Locale::En => "TV Show",
            Locale::PtBr => "Série",
        }
    }

    pub fn file_too_large_notice(self, limit_mb: usize) -> String {
        match self {
            Locale::En => format!("Image must be {limit_mb}MB or smaller"),
            Locale::PtBr => format!("A imagem deve ter no máximo {limit_mb}MB"),
        }
    }

    pub fn unsupported_type_notice(self) -> &'static str {
        match self {
            Locale::En => "Only JPEG, PNG, WEBP or GIF images are allowed",
            Locale::PtBr => "Apenas imagens JPEG, PNG, WEBP ou GIF são permitidas",
        }
    }

    pub fn generic_error_notice(self) -> &'static str {
        match self {
            Locale::En => "Something went wrong, please try again",
            Locale::PtBr => "Algo deu errado, tente novamente",
        }
    }
}
