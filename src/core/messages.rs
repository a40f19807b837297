//! 用户可见的错误类别与本地化文案（en / tr / de / es / fr，其余语言回退英文）

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AiError,
    BlockedPrompt,
    Timeout,
    TokenLimit,
    MaxRetries,
    General,
    Unhandled,
    NoResults,
    EmptyQuery,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AiError => "ai_error",
            ErrorKind::BlockedPrompt => "blocked_prompt",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TokenLimit => "token_limit",
            ErrorKind::MaxRetries => "max_retries",
            ErrorKind::General => "general",
            ErrorKind::Unhandled => "unhandled",
            ErrorKind::NoResults => "no_results",
            ErrorKind::EmptyQuery => "empty_query",
        }
    }

    /// 按语言代码取文案（只看前两个字母，如 "tr-TR" → "tr"）
    pub fn message(&self, lang: &str) -> &'static str {
        let lang = lang.get(..2).unwrap_or(lang).to_ascii_lowercase();
        match lang.as_str() {
            "tr" => self.turkish(),
            "de" => self.german(),
            "es" => self.spanish(),
            "fr" => self.french(),
            _ => self.english(),
        }
    }

    fn english(&self) -> &'static str {
        match self {
            ErrorKind::AiError => "Sorry, something went wrong while generating a response. Please try again. 🙏",
            ErrorKind::BlockedPrompt => "I can't respond to this request because it conflicts with safety guidelines. Let's try another topic. 🛡️",
            ErrorKind::Timeout => "The model took too long to answer. Please try again in a moment. ⏳",
            ErrorKind::TokenLimit => "Our conversation history has grown too long to process this request. Please try a shorter message. 🙏",
            ErrorKind::MaxRetries => "I couldn't complete the request after several attempts. Please try again later. 🙏",
            ErrorKind::General => "Sorry, there was a problem processing your message. Could you try again? 🙏",
            ErrorKind::Unhandled => "I can't process this kind of message right now. 🤔",
            ErrorKind::NoResults => "No search results were found. Try rephrasing your question. 🔍",
            ErrorKind::EmptyQuery => "Please add a search query after the command, e.g. /deep rust async runtimes",
        }
    }

    fn turkish(&self) -> &'static str {
        match self {
            ErrorKind::AiError => "Üzgünüm, yanıt oluşturulurken bir sorun oluştu. Lütfen tekrar deneyin. 🙏",
            ErrorKind::BlockedPrompt => "Bu istek güvenlik kurallarıyla çeliştiği için yanıt veremiyorum. Başka bir konu deneyelim. 🛡️",
            ErrorKind::Timeout => "Model yanıt vermekte çok gecikti. Lütfen biraz sonra tekrar deneyin. ⏳",
            ErrorKind::TokenLimit => "Sohbet geçmişi bu isteği işlemek için fazla uzun. Lütfen daha kısa bir mesaj deneyin. 🙏",
            ErrorKind::MaxRetries => "Birkaç denemeye rağmen istek tamamlanamadı. Lütfen daha sonra tekrar deneyin. 🙏",
            ErrorKind::General => "Üzgünüm, mesajın işlenirken bir sorun oluştu. Tekrar dener misin? 🙏",
            ErrorKind::Unhandled => "Bu tür mesajları şu anda işleyemiyorum. 🤔",
            ErrorKind::NoResults => "Arama sonucu bulunamadı. Sorunu farklı şekilde sormayı dene. 🔍",
            ErrorKind::EmptyQuery => "Lütfen komuttan sonra bir arama sorgusu yaz, örn. /derinarama yapay zeka",
        }
    }

    fn german(&self) -> &'static str {
        match self {
            ErrorKind::AiError => "Entschuldigung, beim Erstellen der Antwort ist ein Fehler aufgetreten. Bitte versuche es erneut. 🙏",
            ErrorKind::BlockedPrompt => "Auf diese Anfrage kann ich nicht antworten, da sie gegen Sicherheitsrichtlinien verstößt. Versuchen wir ein anderes Thema. 🛡️",
            ErrorKind::Timeout => "Das Modell hat zu lange gebraucht. Bitte versuche es gleich noch einmal. ⏳",
            ErrorKind::TokenLimit => "Der Gesprächsverlauf ist zu lang für diese Anfrage. Bitte versuche eine kürzere Nachricht. 🙏",
            ErrorKind::MaxRetries => "Die Anfrage konnte auch nach mehreren Versuchen nicht abgeschlossen werden. Bitte später erneut versuchen. 🙏",
            ErrorKind::General => "Entschuldigung, bei der Verarbeitung deiner Nachricht gab es ein Problem. Versuchst du es noch einmal? 🙏",
            ErrorKind::Unhandled => "Diese Art von Nachricht kann ich momentan nicht verarbeiten. 🤔",
            ErrorKind::NoResults => "Keine Suchergebnisse gefunden. Formuliere die Frage bitte anders. 🔍",
            ErrorKind::EmptyQuery => "Bitte gib nach dem Befehl eine Suchanfrage an, z. B. /deep rust async",
        }
    }

    fn spanish(&self) -> &'static str {
        match self {
            ErrorKind::AiError => "Lo siento, hubo un problema al generar la respuesta. Inténtalo de nuevo. 🙏",
            ErrorKind::BlockedPrompt => "No puedo responder a esta solicitud porque infringe las normas de seguridad. Probemos otro tema. 🛡️",
            ErrorKind::Timeout => "El modelo tardó demasiado en responder. Inténtalo de nuevo en un momento. ⏳",
            ErrorKind::TokenLimit => "El historial de la conversación es demasiado largo para esta solicitud. Prueba con un mensaje más corto. 🙏",
            ErrorKind::MaxRetries => "No pude completar la solicitud tras varios intentos. Inténtalo más tarde. 🙏",
            ErrorKind::General => "Lo siento, hubo un problema al procesar tu mensaje. ¿Puedes intentarlo otra vez? 🙏",
            ErrorKind::Unhandled => "No puedo procesar este tipo de mensaje por ahora. 🤔",
            ErrorKind::NoResults => "No se encontraron resultados. Intenta reformular la pregunta. 🔍",
            ErrorKind::EmptyQuery => "Escribe una consulta después del comando, p. ej. /deep rust async",
        }
    }

    fn french(&self) -> &'static str {
        match self {
            ErrorKind::AiError => "Désolé, un problème est survenu lors de la génération de la réponse. Veuillez réessayer. 🙏",
            ErrorKind::BlockedPrompt => "Je ne peux pas répondre à cette demande car elle enfreint les consignes de sécurité. Essayons un autre sujet. 🛡️",
            ErrorKind::Timeout => "Le modèle a mis trop de temps à répondre. Réessayez dans un instant. ⏳",
            ErrorKind::TokenLimit => "L'historique de la conversation est trop long pour cette demande. Essayez un message plus court. 🙏",
            ErrorKind::MaxRetries => "Impossible de terminer la demande après plusieurs tentatives. Réessayez plus tard. 🙏",
            ErrorKind::General => "Désolé, un problème est survenu lors du traitement de votre message. Pouvez-vous réessayer ? 🙏",
            ErrorKind::Unhandled => "Je ne peux pas traiter ce type de message pour le moment. 🤔",
            ErrorKind::NoResults => "Aucun résultat trouvé. Essayez de reformuler la question. 🔍",
            ErrorKind::EmptyQuery => "Ajoutez une requête après la commande, par ex. /deep rust async",
        }
    }
}
