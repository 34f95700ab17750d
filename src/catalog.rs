//! Static lookup tables the intent classifier is built on.
//!
//! Everything here is ordered: keys and trigger phrases are tried front to
//! back and the first hit wins, so earlier entries shadow later ones.

/// A web destination reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub key: &'static str,
    pub url: &'static str,
    pub name: &'static str,
}

/// A local program reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub key: &'static str,
    pub command: &'static str,
    pub name: &'static str,
}

const fn site(key: &'static str, url: &'static str, name: &'static str) -> Site {
    Site { key, url, name }
}

const fn program(key: &'static str, command: &'static str, name: &'static str) -> Program {
    Program { key, command, name }
}

pub const SITES: &[Site] = &[
    site("google", "https://www.google.com", "Google"),
    site("youtube", "https://www.youtube.com", "YouTube"),
    site("facebook", "https://www.facebook.com", "Facebook"),
    site("twitter", "https://www.twitter.com", "Twitter"),
    // A bare "x" would match any utterance containing the letter.
    site("x.com", "https://www.x.com", "X"),
    site("instagram", "https://www.instagram.com", "Instagram"),
    site("linkedin", "https://www.linkedin.com", "LinkedIn"),
    site("github", "https://www.github.com", "GitHub"),
    site("gmail", "https://mail.google.com", "Gmail"),
    site("whatsapp", "https://web.whatsapp.com", "WhatsApp"),
    site("reddit", "https://www.reddit.com", "Reddit"),
    site("amazon", "https://www.amazon.com.br", "Amazon"),
    site("mercado livre", "https://www.mercadolivre.com.br", "Mercado Livre"),
    site("netflix", "https://www.netflix.com", "Netflix"),
    site("wikipedia", "https://www.wikipedia.org", "Wikipedia"),
    site("stackoverflow", "https://stackoverflow.com", "Stack Overflow"),
    site("stack overflow", "https://stackoverflow.com", "Stack Overflow"),
    site("g1", "https://g1.globo.com", "G1"),
    site("uol", "https://www.uol.com.br", "UOL"),
    site("chatgpt", "https://chat.openai.com", "ChatGPT"),
    site("claude", "https://claude.ai", "Claude"),
    site("gemini", "https://gemini.google.com", "Gemini"),
];

pub const PROGRAMS: &[Program] = &[
    program("calculadora", "calc", "Calculadora"),
    program("calc", "calc", "Calculadora"),
    program("bloco de notas", "notepad", "Bloco de Notas"),
    program("notepad", "notepad", "Notepad"),
    program("paint", "mspaint", "Paint"),
    program("explorador", "explorer", "Explorador"),
    program("explorer", "explorer", "Explorer"),
    program("chrome", "chrome", "Chrome"),
    program("firefox", "firefox", "Firefox"),
    program("edge", "msedge", "Edge"),
    program("word", "winword", "Word"),
    program("excel", "excel", "Excel"),
    program("cmd", "cmd", "CMD"),
    program("terminal", "cmd", "Terminal"),
    program("powershell", "powershell", "PowerShell"),
];

/// Trigger phrases per classifier stage, in stage priority order.
pub mod triggers {
    pub const OPEN_SITE: &[&str] = &[
        "abra", "abre", "abrir", "vai no", "vai na", "vai para", "acessa", "acessar", "acesse",
        "entra no", "entra na",
    ];
    /// Prefix-only: must start the utterance.
    pub const SEARCH: &[&str] = &[
        "pesquise", "pesquisa", "pesquisar", "busque", "busca", "buscar", "procure", "procura",
        "procurar", "google", "googla",
    ];
    pub const OPEN_PROGRAM: &[&str] = &[
        "abre o", "abre a", "abra o", "abra a", "inicia", "iniciar", "roda", "rodar", "executa",
        "executar",
    ];
    pub const CLOSE: &[&str] = &[
        "feche", "fechar", "fecha", "encerra", "encerrar", "sai do", "sai da",
    ];
    pub const SCREENSHOT: &[&str] = &[
        "screenshot", "captura", "print", "printar", "foto da tela", "tira um print",
        "tira uma foto",
    ];
    pub const ANALYZE_SCREEN: &[&str] = &[
        "o que você vê", "o que voce ve", "o que está na tela", "o que esta na tela",
        "descreva a tela", "analise a tela", "veja a tela",
    ];
    pub const FIND_ELEMENT: &[&str] = &[
        "onde está", "onde esta", "encontre", "procure na tela", "localize", "cadê", "cade",
    ];
    pub const READ_SCREEN: &[&str] = &[
        "leia a tela", "leia o texto", "que texto tem", "lê a tela", "ler tela",
    ];
    pub const DESCRIBE_SCREEN: &[&str] = &["descreva", "o que tem na tela", "me conte o que vê"];
    pub const CLICK_ELEMENT: &[&str] = &[
        "clique em", "clica em", "clicar em", "aperte", "pressione",
    ];
}

/// The tables bundled together. Built once and never mutated.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    pub sites: &'static [Site],
    pub programs: &'static [Program],
}

impl Catalog {
    pub const fn builtin() -> Self {
        Self {
            sites: SITES,
            programs: PROGRAMS,
        }
    }

    /// First registered site whose key occurs in `text` (already lowercased).
    pub fn find_site(&self, text: &str) -> Option<&'static Site> {
        self.sites.iter().find(|s| text.contains(s.key))
    }

    /// First registered program whose key occurs in `text` (already lowercased).
    pub fn find_program(&self, text: &str) -> Option<&'static Program> {
        self.programs.iter().find(|p| text.contains(p.key))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// True when any phrase of `list` occurs in `text`.
pub fn contains_any(text: &str, list: &[&str]) -> bool {
    list.iter().any(|phrase| text.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_lowercase() {
        for s in SITES {
            assert_eq!(s.key, s.key.to_lowercase());
        }
        for p in PROGRAMS {
            assert_eq!(p.key, p.key.to_lowercase());
        }
    }

    #[test]
    fn test_find_site_respects_order() {
        let catalog = Catalog::builtin();
        let site = catalog.find_site("abra o gmail").unwrap();
        assert_eq!(site.name, "Gmail");
    }

    #[test]
    fn test_single_letter_does_not_hijack() {
        assert!(Catalog::builtin().find_site("abra o firefox").is_none());
    }
}
