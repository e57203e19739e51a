use repomap::index::Language;

pub fn list_languages() {
    println!("Supported languages:");
    for language in Language::ALL {
        let extensions: Vec<String> = language.extensions().iter().map(|e| format!(".{}", e)).collect();
        println!("  {:<8} {}", language.as_str(), extensions.join(", "));
    }
}
