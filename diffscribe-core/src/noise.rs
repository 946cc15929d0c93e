// noise filter - pure path classification used by every downstream stage

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // lockfiles, build output, minified/generated artefacts, ide/vcs metadata, env files
    static ref NOISY_PATH: Regex = Regex::new(
        r"(?ix)
        ( (^|/) (node_modules|dist|build|target|out|vendor|coverage|__pycache__|\.next|\.nuxt) (/|$)
        | (^|/) (\.git|\.svn|\.hg|\.idea|\.vscode|\.vs) (/|$)
        | (^|/) (package-lock\.json|yarn\.lock|pnpm-lock\.yaml|composer\.lock|gemfile\.lock|poetry\.lock|cargo\.lock|flake\.lock) $
        | \.(min|bundle|packed|compiled)\.(js|css|mjs|cjs)$
        | \.(lock|map|snap|log|tmp|cache)$
        | (^|/) \.env(\.[\w.-]+)? $
        | (^|/) \.ds_store $
        | \.generated\.
        )"
    )
    .unwrap();

    // images, audio, video, archives, fonts, executables and other binary payloads
    static ref BINARY_MEDIA_EXT: Regex = Regex::new(
        r"(?i)\.(png|jpe?g|gif|bmp|ico|webp|tiff?|svgz?|psd|mp3|wav|ogg|flac|aac|m4a|mp4|avi|mov|wmv|flv|mkv|webm|zip|tar|gz|tgz|bz2|xz|rar|7z|woff2?|eot|ttf|otf|exe|dll|so|dylib|bin|dat|o|obj|a|lib|class|jar|war|pdf|pyc|wasm)$"
    )
    .unwrap();
}

/// true when a path points at generated, vendored or otherwise signal-free content
pub fn is_noisy_path(path: &str) -> bool {
    NOISY_PATH.is_match(path)
}

/// true when a path carries a binary or media payload that must never reach the model
pub fn is_binary_or_media(path: &str) -> bool {
    BINARY_MEDIA_EXT.is_match(path)
}
